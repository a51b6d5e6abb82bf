//! Configuration error types shared by the session daemon and the credential store

use thiserror::Error;

/// Common error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_includes_detail() {
        let err = Error::Config("callback_path must start with '/'".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: callback_path must start with '/'"
        );
    }

    #[test]
    fn io_error_converts_via_question_mark() {
        fn read_missing() -> Result<String> {
            Ok(std::fs::read_to_string("/nonexistent/api-session.toml")?)
        }
        let err = read_missing().unwrap_err();
        assert!(
            err.to_string().starts_with("I/O error:"),
            "got: {err}"
        );
    }
}
