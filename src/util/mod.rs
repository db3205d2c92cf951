//! Utility functions shared by the engine, the server and the CLI.
//!
//! - **URL validation**: scheme and host policy checks for feed and relay targets
//! - **Text processing**: plain-text previews from HTML, terminal-safe output

mod text;
mod url_validator;

pub use text::{plain_text_preview, strip_control_chars, truncate_to_width, PREVIEW_MAX_CHARS};
pub use url_validator::{validate_url, HostPolicy, UrlValidationError};
