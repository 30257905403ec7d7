use std::str::FromStr;

use crate::error::ApiError;

/// Environment source. `process_env` in production, a map-backed closure in tests.
pub type EnvLookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

pub fn non_empty(lookup: &EnvLookup<'_>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn parse_number<T: FromStr>(lookup: &EnvLookup<'_>, key: &str, default: T) -> Result<T, ApiError> {
    match non_empty(lookup, key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::ConfigurationError(format!("{} must be a number, got '{}'", key, raw))),
        None => Ok(default),
    }
}

pub fn parse_bool(lookup: &EnvLookup<'_>, key: &str, default: bool) -> Result<bool, ApiError> {
    match non_empty(lookup, key).map(|raw| raw.to_ascii_lowercase()) {
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ApiError::ConfigurationError(format!(
                "{} must be true or false, got '{}'",
                key, raw
            ))),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_count_as_unset() {
        let lookup = |_: &str| Some("   ".to_string());
        assert_eq!(non_empty(&lookup, "API_KEY"), None);
        assert_eq!(parse_number(&lookup, "PORT", 10000u16).unwrap(), 10000);
        assert!(parse_bool(&lookup, "FLAG", true).unwrap());
    }

    #[test]
    fn parses_bool_spellings() {
        for (raw, expected) in [("TRUE", true), ("on", true), ("0", false), ("No", false)] {
            let lookup = move |_: &str| Some(raw.to_string());
            assert_eq!(parse_bool(&lookup, "FLAG", !expected).unwrap(), expected);
        }
        let lookup = |_: &str| Some("maybe".to_string());
        assert!(parse_bool(&lookup, "FLAG", true).is_err());
    }

    #[test]
    fn lookup_may_borrow_local_state() {
        let vars = std::collections::HashMap::from([("PORT", "8080".to_string())]);
        let lookup = |key: &str| vars.get(key).cloned();
        assert_eq!(parse_number(&lookup, "PORT", 10000u16).unwrap(), 8080);
        assert_eq!(non_empty(&lookup, "HOST"), None);
    }
}
