//! Branch and tag filters for registry targets.
//!
//! A filter list passes when no negated (`!`) pattern matches and, if any
//! positive pattern exists, at least one of them matches. `@name` expands to
//! the named pattern list from configuration.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::warn;

/// Compiled filter list.
#[derive(Debug, Default)]
pub struct Filter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    /// Set when any positive pattern was given, even one that expanded to
    /// nothing.
    positive: bool,
}

impl Filter {
    pub fn new(patterns: &[String], named: &BTreeMap<String, Vec<String>>) -> Self {
        let mut filter = Filter::default();
        for pattern in patterns {
            let (negated, body) = match pattern.strip_prefix('!') {
                Some(rest) => (true, rest.trim()),
                None => (false, pattern.trim()),
            };
            let expanded: Vec<&str> = match body.strip_prefix('@') {
                Some(name) => match named.get(name) {
                    Some(list) => list.iter().map(String::as_str).collect(),
                    None => {
                        warn!(pattern = %name, "unknown named pattern");
                        filter.positive |= !negated;
                        continue;
                    }
                },
                None => vec![body],
            };
            filter.positive |= !negated;
            let target = if negated {
                &mut filter.exclude
            } else {
                &mut filter.include
            };
            target.extend(expanded.into_iter().filter_map(glob));
        }
        filter
    }

    pub fn is_empty(&self) -> bool {
        !self.positive && self.exclude.is_empty()
    }

    /// Evaluate against a value; `None` means there is nothing to match.
    pub fn matches(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return !self.positive;
        };
        if self.exclude.iter().any(|re| re.is_match(value)) {
            return false;
        }
        !self.positive || self.include.iter().any(|re| re.is_match(value))
    }
}

/// Whether a registry target applies to the current branch and tag.
pub fn target_applies(
    on_branches: &[String],
    on_tags: &[String],
    named: &BTreeMap<String, Vec<String>>,
    branch: Option<&str>,
    tag: Option<&str>,
) -> bool {
    Filter::new(on_branches, named).matches(branch) && Filter::new(on_tags, named).matches(tag)
}

/// Compile a `*`/`?` glob into an anchored regex.
fn glob(pattern: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
        .map_err(|e| warn!(pattern, error = %e, "invalid filter pattern"))
        .ok()
}
