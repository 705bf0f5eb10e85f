//! Secret values.

use crate::error::{Error, Result};
use std::fmt;

const REDACTED: &str = "***";

/// An opaque secret such as the benchmark service token.
///
/// `Debug` and `Display` never print the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue {
    value: String,
}

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Read a secret from the process environment.
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => Ok(Self::new(value)),
            _ => Err(Error::SecretNotFound(var.to_string())),
        }
    }

    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretValue").field(&REDACTED).finish()
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Credentials passed to the benchmark service.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Environment variable name the service expects the token in.
    pub token_env: String,
    pub token: SecretValue,
}

impl Credentials {
    pub fn new(token_env: impl Into<String>, token: SecretValue) -> Self {
        Self {
            token_env: token_env.into(),
            token,
        }
    }

    pub fn from_env(token_env: &str) -> Result<Self> {
        Ok(Self::new(token_env, SecretValue::from_env(token_env)?))
    }

    /// Mask the token in arbitrary text.
    pub fn mask(&self, input: &str) -> String {
        mask_secrets(input, [&self.token])
    }
}

/// Replace every occurrence of each secret in `input` with `***`.
pub fn mask_secrets<'a>(input: &str, secrets: impl IntoIterator<Item = &'a SecretValue>) -> String {
    let mut output = input.to_string();
    for secret in secrets {
        if !secret.is_empty() {
            output = output.replace(secret.expose(), REDACTED);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_are_redacted() {
        let secret = SecretValue::new("hunter2");
        assert_eq!(format!("{secret}"), "***");
        assert!(!format!("{secret:?}").contains("hunter2"));

        let creds = Credentials::new("CODSPEED_TOKEN", secret);
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn test_mask_replaces_every_occurrence() {
        let creds = Credentials::new("T", SecretValue::new("tok"));
        assert_eq!(creds.mask("auth tok; retry tok"), "auth ***; retry ***");
    }

    #[test]
    fn test_empty_secret_is_not_masked() {
        assert_eq!(mask_secrets("abc", [&SecretValue::new("")]), "abc");
    }

    #[test]
    fn test_missing_env_secret() {
        let err = SecretValue::from_env("BENCHLINE_TEST_SURELY_UNSET_VAR").unwrap_err();
        assert!(matches!(err, Error::SecretNotFound(_)));
    }
}
