//! Environment block construction for spawned plugins.

use std::collections::BTreeMap;

/// Build an exec-ready environment block.
///
/// The ambient entries come first, followed by the overrides. Duplicate keys
/// are kept; the launcher applies entries in order, so the later one wins.
pub fn build_environment<I, K, V>(
    ambient: I,
    overrides: Option<&BTreeMap<String, String>>,
) -> Vec<String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut block: Vec<String> = ambient
        .into_iter()
        .map(|(key, value)| format!("{}={}", key.as_ref(), value.as_ref()))
        .collect();

    if let Some(overrides) = overrides {
        block.extend(
            overrides
                .iter()
                .map(|(key, value)| format!("{}={}", key, value)),
        );
    }

    block
}

/// Snapshot of the current process environment.
///
/// Entries that are not valid UTF-8 are skipped.
pub fn ambient_environment() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Split a `KEY=VALUE` entry at the first `=`.
pub fn split_entry(entry: &str) -> Option<(&str, &str)> {
    entry.split_once('=').filter(|(key, _)| !key.is_empty())
}
