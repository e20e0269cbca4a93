//! `${VAR}` substitution in manifest text.

use std::sync::LazyLock;

use lanekit_shared::errors::{LaneError, LaneResult};
use regex::{Captures, Regex};

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns a manifest error naming every variable that is not set.
pub fn substitute_env_vars(input: &str) -> LaneResult<String> {
    let mut missing = Vec::new();
    let result = ENV_VAR_RE.replace_all(input, |caps: &Captures<'_>| {
        match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                missing.push(caps[1].to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(LaneError::Manifest {
            path: "$".to_string(),
            reason: format!("missing environment variable(s): {}", missing.join(", ")),
        });
    }

    Ok(result.into_owned())
}
