//! Environment sanitization for analyzer processes.
//!
//! Analyzers are untrusted external tools: they get the host's environment
//! minus anything that looks like a credential.

use std::env;

use tokio::process::Command;

/// Variables removed from every analyzer environment. Matched case-insensitively.
pub const ENV_SECRET_DENYLIST: &[&str] = &[
    "*_API_KEY",
    "*_ACCESS_KEY*",
    "*_TOKEN",
    "*_SECRET*",
    "*PASSWORD*",
    "*CREDENTIAL*",
    "AWS_*",
    "AZURE_*",
    "GITHUB_TOKEN",
    "NPM_TOKEN",
    "SSH_AUTH_SOCK",
];

/// Minimal glob matcher for denylist patterns.
/// Handles `*_SUFFIX`, `PREFIX_*`, `*_INFIX*`, and exact match.
/// Both pattern and key are compared in uppercase.
pub(crate) fn env_glob_matches(pattern: &str, key_upper: &str) -> bool {
    let pat = pattern.to_uppercase();
    match (pat.starts_with('*'), pat.ends_with('*') && pat.len() > 1) {
        (true, true) => key_upper.contains(&pat[1..pat.len() - 1]),
        (true, false) => key_upper.ends_with(&pat[1..]),
        (false, true) => key_upper.starts_with(&pat[..pat.len() - 1]),
        (false, false) => key_upper == pat,
    }
}

#[must_use]
pub fn is_denied(key: &str, denylist: &[String]) -> bool {
    let upper = key.to_uppercase();
    denylist.iter().any(|pat| env_glob_matches(pat, &upper))
}

/// Strip denied variables from `cmd`'s inherited environment.
pub(crate) fn apply_sanitized_env(cmd: &mut Command, denylist: &[String]) -> usize {
    let mut removed = 0;
    for (key, _) in env::vars_os() {
        let Some(key) = key.to_str() else { continue };
        if is_denied(key, denylist) {
            cmd.env_remove(key);
            removed += 1;
        }
    }
    removed
}

#[must_use]
pub fn default_denylist() -> Vec<String> {
    ENV_SECRET_DENYLIST.iter().map(|s| (*s).to_string()).collect()
}
