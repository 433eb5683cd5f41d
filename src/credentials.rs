//! API credential resolution: explicit value, then OS keyring, then environment.

use keyring::Entry;
use std::env;

const KEYRING_SERVICE: &str = "ai-kit";

/// Resolves a credential for `provider`.
///
/// Order: `explicit` (if non-empty), keyring entry `ai-kit/<provider>`, then the
/// first non-empty variable in `env_vars`.
pub fn resolve_api_key(provider: &str, explicit: Option<&str>, env_vars: &[&str]) -> Option<String> {
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }

    if let Ok(entry) = Entry::new(KEYRING_SERVICE, provider) {
        if let Ok(key) = entry.get_password() {
            if !key.trim().is_empty() {
                return Some(key);
            }
        }
    }

    from_env(env_vars)
}

fn from_env(env_vars: &[&str]) -> Option<String> {
    env_vars
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

pub const REPLICATE_ENV: &[&str] = &["REPLICATE_API_TOKEN"];
pub const GEMINI_ENV: &[&str] = &["AI_KIT_GOOGLE_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];
pub const MESHY_ENV: &[&str] = &["MESHY_API_KEY"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_key_wins() {
        let key = resolve_api_key("replicate", Some("  r8_abc "), &[]);
        assert_eq!(key.as_deref(), Some("r8_abc"));
    }

    #[test]
    fn test_env_order_skips_empty() {
        env::set_var("AI_KIT_TEST_CRED_EMPTY", "");
        env::set_var("AI_KIT_TEST_CRED_SET", "second");
        let key = from_env(&["AI_KIT_TEST_CRED_MISSING", "AI_KIT_TEST_CRED_EMPTY", "AI_KIT_TEST_CRED_SET"]);
        assert_eq!(key.as_deref(), Some("second"));
    }
}
