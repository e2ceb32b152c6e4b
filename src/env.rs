//! Startup environment lookup.

use crate::types::{Error, Result};

/// Read a required environment variable.
///
/// Unset and empty are distinct failures; both carry the variable name and
/// `description` so the operator can tell which input is missing. Any
/// non-empty value, whitespace included, is returned untouched.
pub fn resolve(name: &str, description: &str) -> Result<String> {
    let value = std::env::var_os(name).ok_or_else(|| Error::MissingConfiguration {
        name: name.to_string(),
        description: description.to_string(),
    })?;

    let value = value.into_string().map_err(|_| {
        Error::validation(format!("the '{}' environment variable is not valid UTF-8", name))
    })?;

    if value.is_empty() {
        return Err(Error::EmptyConfiguration {
            name: name.to_string(),
            description: description.to_string(),
        });
    }

    Ok(value)
}
