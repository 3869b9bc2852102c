pub mod sql_sanitizer;

pub use sql_sanitizer::SqlSanitizer;
