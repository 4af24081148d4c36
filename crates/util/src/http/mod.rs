pub mod decode;
pub mod path;

pub use decode::*;
pub use path::*;
