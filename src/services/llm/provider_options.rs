//! Provider Options
//!
//! Per-provider annotations attached to outgoing messages. The coordinator
//! only produces ephemeral cache-control hints.

use std::collections::BTreeMap;

use serde_json::{json, Value};

/// Mapping from provider name to its provider-specific options.
pub type ProviderOptions = BTreeMap<String, Value>;

/// Providers that understand the ephemeral cache-control hint.
pub const CACHE_CONTROL_PROVIDERS: [&str; 3] = ["anthropic", "bedrock", "vercel"];

/// Environment flag that disables cache-control annotations.
pub const DISABLE_CACHE_ENV: &str = "CRUSH_DISABLE_ANTHROPIC_CACHE";

/// Parse a strict boolean flag: `1/t/true` forms or `0/f/false` forms, else `None`.
pub fn parse_env_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Ephemeral cache-control options, honoring the disable flag from the
/// process environment.
pub fn cache_control_options() -> ProviderOptions {
    let disabled = std::env::var(DISABLE_CACHE_ENV)
        .ok()
        .and_then(|v| parse_env_bool(&v))
        .unwrap_or(false);
    cache_control_options_with(disabled)
}

/// Ephemeral cache-control options; empty when `disabled`.
pub fn cache_control_options_with(disabled: bool) -> ProviderOptions {
    if disabled {
        return ProviderOptions::new();
    }
    CACHE_CONTROL_PROVIDERS
        .iter()
        .map(|provider| {
            (
                provider.to_string(),
                json!({ "cache_control": { "type": "ephemeral" } }),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_bool() {
        for truthy in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_env_bool(truthy), Some(true), "{}", truthy);
        }
        for falsy in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_env_bool(falsy), Some(false), "{}", falsy);
        }
        assert_eq!(parse_env_bool("yes"), None);
        assert_eq!(parse_env_bool(""), None);
    }

    #[test]
    fn test_cache_control_enabled() {
        let options = cache_control_options_with(false);
        assert_eq!(options.len(), 3);
        for provider in CACHE_CONTROL_PROVIDERS {
            assert_eq!(options[provider]["cache_control"]["type"], "ephemeral");
        }
    }

    #[test]
    fn test_cache_control_disabled() {
        assert!(cache_control_options_with(true).is_empty());
    }
}
