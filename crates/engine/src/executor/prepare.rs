//! Step preparation helpers.

use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use verity_types::{EqualsTarget, FieldRule, ShapeContract, StepDefinition};
use verity_util::{
    build_path,
    http::{encode_path_segment, unfilled_placeholders},
};

use super::transport::HttpRequest;
use crate::{
    resolve::{RunContext, format_json_value, interpolate_text, interpolate_text_with, interpolate_value},
    templates::{UnresolvedTemplateRef, collect_unresolved_templates_from_str, collect_unresolved_templates_from_value},
};

/// Builds the request for a step by interpolating templates against the
/// run context and filling `{name}` path placeholders.
///
/// Values spliced into the path, whether from `${{ }}` or `{name}`, are
/// percent-encoded as single segments.
///
/// This must run as late as possible so `steps.<id>` and `vars.*`
/// references see everything earlier steps produced.
pub fn prepare_request(step: &StepDefinition, endpoint: &str, run_context: &RunContext) -> HttpRequest {
    let call = &step.request;
    let path_params: IndexMap<String, Value> = call
        .path_params
        .iter()
        .map(|(name, value)| (name.clone(), interpolate_value(value, run_context)))
        .collect();
    let path = build_path(
        &interpolate_text_with(&call.path, run_context, encode_path_segment),
        &path_params,
    );

    let headers = call
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), interpolate_text(value, run_context)))
        .collect();

    let mut query = Vec::new();
    for (name, value) in &call.query {
        match interpolate_value(value, run_context) {
            Value::Array(items) => query.extend(items.iter().map(|item| (name.clone(), format_json_value(item)))),
            Value::Null => {}
            other => query.push((name.clone(), format_json_value(&other))),
        }
    }

    HttpRequest {
        endpoint: endpoint.to_string(),
        method: call.method,
        path,
        headers,
        query,
        body: call.body.as_ref().map(|body| interpolate_value(body, run_context)),
        timeout: call.timeout_ms.map(Duration::from_millis),
    }
}

/// Reports unresolved template expressions anywhere in a step's request or
/// in `equals.value` contract rules, plus path placeholders left unfilled.
///
/// Returned entries include the source field path and original expression.
pub fn collect_unresolved_step_templates(step: &StepDefinition, run_context: &RunContext) -> Vec<UnresolvedTemplateRef> {
    let call = &step.request;
    let mut unresolved = Vec::new();

    collect_unresolved_templates_from_str(&call.path, "request.path", run_context, &mut unresolved);
    for (name, value) in &call.path_params {
        collect_unresolved_templates_from_value(value, format!("request.path_params.{name}").as_str(), run_context, &mut unresolved);
    }
    for (name, value) in &call.headers {
        collect_unresolved_templates_from_str(value, format!("request.headers.{name}").as_str(), run_context, &mut unresolved);
    }
    for (name, value) in &call.query {
        collect_unresolved_templates_from_value(value, format!("request.query.{name}").as_str(), run_context, &mut unresolved);
    }
    if let Some(body) = &call.body {
        collect_unresolved_templates_from_value(body, "request.body", run_context, &mut unresolved);
    }
    collect_unresolved_in_rules(&step.expect.contract.fields, run_context, &mut unresolved);

    for placeholder in unfilled_placeholders(&call.path) {
        if !call.path_params.contains_key(&placeholder) {
            unresolved.push(UnresolvedTemplateRef {
                source_path: "request.path".to_string(),
                expression: format!("path_params.{placeholder}"),
            });
        }
    }

    unresolved
}

fn collect_unresolved_in_rules(rules: &[FieldRule], run_context: &RunContext, unresolved: &mut Vec<UnresolvedTemplateRef>) {
    for rule in rules {
        if let Some(EqualsTarget::Value(expected)) = &rule.equals {
            let source = format!("expect.contract.{}.equals", rule.path);
            collect_unresolved_templates_from_value(expected, source.as_str(), run_context, unresolved);
        }
        collect_unresolved_in_rules(&rule.fields, run_context, unresolved);
    }
}

/// Resolves `equals.value` templates so the validator only sees literals.
pub fn resolve_contract(contract: &ShapeContract, run_context: &RunContext) -> ShapeContract {
    ShapeContract {
        root: contract.root,
        fields: contract.fields.iter().map(|rule| resolve_rule(rule, run_context)).collect(),
    }
}

fn resolve_rule(rule: &FieldRule, run_context: &RunContext) -> FieldRule {
    let mut resolved = rule.clone();
    if let Some(EqualsTarget::Value(expected)) = &rule.equals {
        resolved.equals = Some(EqualsTarget::Value(interpolate_value(expected, run_context)));
    }
    resolved.fields = rule.fields.iter().map(|child| resolve_rule(child, run_context)).collect();
    resolved
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use verity_types::{HttpCall, HttpMethod};

    use super::*;

    fn delete_catalog_step() -> StepDefinition {
        let mut path_params = IndexMap::new();
        path_params.insert("catalogId".to_string(), json!("${{ vars.catalogId }}"));
        let mut query = IndexMap::new();
        query.insert("tags".to_string(), json!(["summer", "sale"]));
        query.insert("limit".to_string(), json!("${{ vars.limit ?? 20 }}"));
        let mut headers = IndexMap::new();
        headers.insert("Authorization".to_string(), "Bearer ${{ vars.token }}".to_string());

        StepDefinition {
            id: "delete_catalog".into(),
            request: HttpCall {
                method: HttpMethod::Delete,
                path: "/catalog/{catalogId}".into(),
                path_params,
                headers,
                query,
                body: Some(json!({"reason": "cleanup ${{ run.id }}"})),
                timeout_ms: Some(1500),
            },
            ..Default::default()
        }
    }

    #[test]
    fn prepare_request_interpolates_every_part() {
        let mut context = RunContext::new("run-9");
        context.variables.set("catalogId", json!("65f0c1d2e3a4b5c6d7e8f901"), "create_catalog");
        context.variables.set("token", json!("abc"), "login");

        let request = prepare_request(&delete_catalog_step(), "default", &context);
        assert_eq!(request.path, "/catalog/65f0c1d2e3a4b5c6d7e8f901");
        assert_eq!(request.headers["Authorization"], "Bearer abc");
        assert_eq!(
            request.query,
            vec![
                ("tags".to_string(), "summer".to_string()),
                ("tags".to_string(), "sale".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
        assert_eq!(request.body, Some(json!({"reason": "cleanup run-9"})));
        assert_eq!(request.timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn templated_path_values_are_encoded_as_one_segment() {
        let mut context = RunContext::default();
        context.variables.set("title", json!("team/summer?sale"), "create_catalog");
        context.variables.set("page", json!(2), "list");
        let step = StepDefinition {
            id: "by_title".into(),
            request: HttpCall {
                path: "/catalog/by-title/${{ vars.title }}/page-${{ vars.page }}".into(),
                ..Default::default()
            },
            ..Default::default()
        };

        let request = prepare_request(&step, "default", &context);
        assert_eq!(request.path, "/catalog/by-title/team%2Fsummer%3Fsale/page-2");
    }

    #[test]
    fn unresolved_templates_are_reported_with_locations() {
        let context = RunContext::default();
        let unresolved = collect_unresolved_step_templates(&delete_catalog_step(), &context);
        let locations: Vec<&str> = unresolved.iter().map(|entry| entry.source_path.as_str()).collect();
        assert_eq!(locations, vec!["request.path_params.catalogId", "request.headers.Authorization"]);
    }

    #[test]
    fn missing_path_param_is_reported() {
        let step = StepDefinition {
            id: "get_video".into(),
            request: HttpCall {
                path: "/video/{videoId}".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let unresolved = collect_unresolved_step_templates(&step, &RunContext::default());
        assert_eq!(unresolved[0].expression, "path_params.videoId");
    }
}
