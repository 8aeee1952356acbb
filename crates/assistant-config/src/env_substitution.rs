use assistant_core::{AssistantError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::env;

// ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("Invalid regex pattern")
});

/// Expand `${VAR}` references in every string of a parsed config document.
///
/// Keeping keys out of the YAML file is the common case:
/// `api_key: ${OPENAI_API_KEY}`.
pub fn substitute_env_vars(value: &mut Value) -> Result<()> {
    match value {
        Value::String(s) => {
            *s = substitute_in_string(s)?;
        }
        Value::Object(map) => {
            for v in map.values_mut() {
                substitute_env_vars(v)?;
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                substitute_env_vars(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn substitute_in_string(input: &str) -> Result<String> {
    let mut missing = Vec::new();

    let expanded = ENV_VAR_REGEX.replace_all(input, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match (env::var(name), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                missing.push(name.to_string());
                String::new()
            }
        }
    });
    let expanded = expanded.into_owned();

    if !missing.is_empty() {
        return Err(AssistantError::Config(format!(
            "Missing required environment variables: {}",
            missing.join(", ")
        )));
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_substitute_env_vars() {
        env::set_var("PA_TEST_KEY", "sk-from-env");

        let mut value = json!({
            "settings": {
                "api_key": "${PA_TEST_KEY}",
                "model_id": "${PA_TEST_MODEL:-gpt-4}"
            },
            "list": ["${PA_TEST_KEY}/x"]
        });

        substitute_env_vars(&mut value).unwrap();

        assert_eq!(value["settings"]["api_key"], "sk-from-env");
        assert_eq!(value["settings"]["model_id"], "gpt-4");
        assert_eq!(value["list"][0], "sk-from-env/x");

        env::remove_var("PA_TEST_KEY");
    }

    #[test]
    fn test_missing_variable_is_reported() {
        let mut value = json!({ "api_key": "${PA_TEST_DEFINITELY_UNSET}" });
        let err = substitute_env_vars(&mut value).unwrap_err();
        assert!(err.to_string().contains("PA_TEST_DEFINITELY_UNSET"));
    }
}
