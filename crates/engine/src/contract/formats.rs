//! Named string formats.

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;
use verity_types::FieldFormat;

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[0-9]{10,15}$").expect("valid phone regex"));
static OBJECT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("valid object id regex"));
static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));
static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").expect("valid uuid regex")
});

/// Checks `value` against a named format, returning a reason on mismatch.
pub fn check_format(format: FieldFormat, value: &str) -> Result<(), String> {
    let ok = match format {
        FieldFormat::Phone => PHONE.is_match(value),
        FieldFormat::ObjectId => OBJECT_ID.is_match(value),
        FieldFormat::Email => EMAIL.is_match(value),
        FieldFormat::Uuid => UUID.is_match(value),
        FieldFormat::Uri => {
            return Url::parse(value).map(|_| ()).map_err(|error| format!("'{value}' is not a valid uri: {error}"));
        }
        FieldFormat::DateTime => {
            return DateTime::parse_from_rfc3339(value)
                .map(|_| ())
                .map_err(|error| format!("'{value}' is not an RFC 3339 date-time: {error}"));
        }
    };
    if ok {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid {}", value, format.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_requires_leading_plus_and_length() {
        assert!(check_format(FieldFormat::Phone, "+91620484373").is_ok());
        assert!(check_format(FieldFormat::Phone, "620484373").is_err());
        assert!(check_format(FieldFormat::Phone, "+123").is_err());
    }

    #[test]
    fn object_id_is_24_hex_chars() {
        assert!(check_format(FieldFormat::ObjectId, "65f0c1d2e3a4b5c6d7e8f901").is_ok());
        assert!(check_format(FieldFormat::ObjectId, "65f0c1d2e3a4b5c6d7e8f90").is_err());
        assert!(check_format(FieldFormat::ObjectId, "zzf0c1d2e3a4b5c6d7e8f901").is_err());
    }

    #[test]
    fn uri_date_time_email_and_uuid() {
        assert!(check_format(FieldFormat::Uri, "https://cdn.example.com/v/1.mp4").is_ok());
        assert!(check_format(FieldFormat::Uri, "not a uri").is_err());
        assert!(check_format(FieldFormat::DateTime, "2024-03-01T10:15:00Z").is_ok());
        assert!(check_format(FieldFormat::DateTime, "01/03/2024").is_err());
        assert!(check_format(FieldFormat::Email, "qa@example.com").is_ok());
        assert!(check_format(FieldFormat::Email, "qa.example.com").is_err());
        assert!(check_format(FieldFormat::Uuid, "7f9c24e5-2b8a-4c1e-9d3f-0a1b2c3d4e5f").is_ok());
    }
}
