//! Required-field validation run before any request is built.

use crate::client::ClientError;
use crate::options::SecretString;

/// Checks a value before it is sent.
pub trait Validate {
    fn validate(&self) -> Result<(), ClientError>;
}

/// Collects violated constraints and reports them all at once.
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `field` as missing when `value` is blank.
    pub fn require_text(mut self, field: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            self.0.push(format!("{field} is required"));
        }
        self
    }

    pub fn require_secret(mut self, field: &str, value: &SecretString) -> Self {
        if value.is_empty() {
            self.0.push(format!("{field} is required"));
        }
        self
    }

    /// Like [`Violations::require_text`], and also rejects the dot segments
    /// `.` and `..`, which URL normalization would collapse.
    pub fn require_path_id(self, field: &str, value: &str) -> Self {
        let dot_segment = matches!(value, "." | "..");
        self.require_text(field, value)
            .check(!dot_segment, &format!("{field} must not be a dot segment"))
    }

    /// Record `field` as missing when `value` is `None`.
    pub fn require_some<T>(mut self, field: &str, value: &Option<T>) -> Self {
        if value.is_none() {
            self.0.push(format!("{field} is required"));
        }
        self
    }

    /// Record an arbitrary rule that failed when `ok` is false.
    pub fn check(mut self, ok: bool, message: &str) -> Self {
        if !ok {
            self.0.push(message.to_string());
        }
        self
    }

    pub fn finish(self) -> Result<(), ClientError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Validation(self.0.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_violations_are_reported() {
        let err = Violations::new()
            .require_text("user", "  ")
            .require_secret("api_key", &SecretString::default())
            .require_some::<u8>("file", &None)
            .require_text("query", "hi")
            .finish()
            .unwrap_err();

        match err {
            ClientError::Validation(msg) => {
                assert_eq!(msg, "user is required; api_key is required; file is required")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_require_path_id() {
        assert!(Violations::new().require_path_id("task_id", "t-1/../x").finish().is_ok());
        assert!(matches!(
            Violations::new().require_path_id("task_id", "..").finish(),
            Err(ClientError::Validation(msg)) if msg == "task_id must not be a dot segment"
        ));
        assert!(Violations::new().require_path_id("task_id", " ").finish().is_err());
    }

    #[test]
    fn test_check() {
        assert!(Violations::new().check(true, "never").finish().is_ok());
        assert!(matches!(
            Violations::new().check(false, "handler is required").finish(),
            Err(ClientError::Validation(msg)) if msg == "handler is required"
        ));
    }
}
