//! Utility functions for common operations.
//!
//! - **URL validation**: the API base URL must be HTTPS (loopback excepted)
//! - **Text processing**: control-character stripping and name normalization
//!   for strings received from the remote service

mod text;
mod url_validator;

pub use text::{sanitize_name, strip_control_chars, strip_rtl_wrapper};
pub use url_validator::{validate_api_base_url, UrlValidationError};
