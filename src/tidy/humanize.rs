//! Mapping of provider parameter codes to readable snake_case names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Converts a parameter code to snake_case: `roadSurfaceTemperature` becomes
/// `road_surface_temperature`, `TT_10` becomes `tt_10`. Idempotent.
pub fn humanize(code: &str) -> String {
    let chars: Vec<char> = code.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 && !out.ends_with('_') {
            let previous = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if previous.is_lowercase()
                || previous.is_ascii_digit()
                || (previous.is_uppercase() && next_is_lower)
            {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Provider parameter codes mapped to readable names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMap(BTreeMap<String, String>);

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>, name: impl Into<String>) {
        self.0.insert(code.into(), name.into());
    }

    /// Readable name for `code`: the mapped name if any, otherwise the code
    /// itself, always in snake_case.
    pub fn humanize(&self, code: &str) -> String {
        let trimmed = code.trim();
        let mapped = self
            .0
            .get(trimmed)
            .or_else(|| {
                self.0
                    .iter()
                    .find(|(known, _)| known.eq_ignore_ascii_case(trimmed))
                    .map(|(_, name)| name)
            })
            .map(String::as_str)
            .unwrap_or(trimmed);
        humanize(mapped)
    }

    /// Provider code whose code or readable name equals `name`, compared
    /// after humanizing both.
    pub fn code_for(&self, name: &str) -> Option<&str> {
        let wanted = humanize(name);
        self.0
            .iter()
            .find(|(code, readable)| humanize(code) == wanted || humanize(readable) == wanted)
            .map(|(code, _)| code.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
