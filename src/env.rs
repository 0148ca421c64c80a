//! Environment variable substitution for configuration text
//!
//! Connection blocks usually carry credentials (cloud keys, WebDAV
//! passwords) that should not live in the file itself. References are
//! written `${VAR_NAME}` or `${VAR_NAME:-fallback}` and are resolved before
//! the YAML is parsed. Lines that are YAML comments are left alone.

use std::env;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::ConfigError;

/// `${NAME}` or `${NAME:-fallback}`
static ENV_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("static pattern")
});

/// Substitute environment references in configuration text.
///
/// Every unset variable without a fallback is collected and reported in a
/// single error.
///
/// ```ignore
/// use vfs_adapter::env::substitute_env_vars;
///
/// std::env::set_var("DAV_PASSWORD", "secret_value");
/// let result = substitute_env_vars("password: ${DAV_PASSWORD}").unwrap();
/// assert_eq!(result, "password: secret_value");
/// ```
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing: Vec<String> = Vec::new();

    let lines: Vec<String> = input
        .split_inclusive('\n')
        .map(|line| {
            if line.trim_start().starts_with('#') {
                return line.to_string();
            }
            ENV_REFERENCE
                .replace_all(line, |caps: &Captures| {
                    let name = &caps[1];
                    match (env::var(name), caps.get(2)) {
                        (Ok(value), _) => value,
                        (Err(_), Some(fallback)) => fallback.as_str().to_string(),
                        (Err(_), None) => {
                            if !missing.iter().any(|m| m == name) {
                                missing.push(name.to_string());
                            }
                            String::new()
                        }
                    }
                })
                .into_owned()
        })
        .collect();

    if !missing.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing.join(", ")
        )));
    }

    Ok(lines.concat())
}
