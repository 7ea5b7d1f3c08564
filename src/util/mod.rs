//! Utility functions for common operations.
//!
//! - **URL validation**: input normalisation and the SSRF address policy
//! - **Text processing**: cleanup of titles scraped from untrusted pages

mod text;
mod url_validator;

pub use text::clean_text;
pub use url_validator::{
    check_host, is_disallowed_ip, normalize_target, validate_scheme, UrlValidationError,
};
