//! Date format handling for `{date:FORMAT}` and `{commit_date:FORMAT}`.
//!
//! A format containing `%` is taken as strftime. Anything else is read as a
//! reference-date layout (`2006-01-02 15:04:05`) and translated.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};

/// Reference-layout fragments, longest first where prefixes overlap.
const LAYOUT_TOKENS: &[(&str, &str)] = &[
    ("January", "%B"),
    ("Monday", "%A"),
    ("2006", "%Y"),
    (".000", ".%3f"),
    ("Jan", "%b"),
    ("Mon", "%a"),
    ("MST", "%Z"),
    ("01", "%m"),
    ("02", "%d"),
    ("15", "%H"),
    ("03", "%I"),
    ("04", "%M"),
    ("05", "%S"),
    ("06", "%y"),
    ("PM", "%p"),
];

/// Translate a reference layout into a strftime string.
pub fn to_strftime(layout: &str) -> String {
    if layout.contains('%') {
        return layout.to_string();
    }

    let mut out = String::with_capacity(layout.len() * 2);
    let mut rest = layout;
    'scan: while !rest.is_empty() {
        for (token, spec) in LAYOUT_TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = tail;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// Format `at` with a strftime string or reference layout.
///
/// Returns `None` when the format contains an invalid specifier.
pub fn format(at: &DateTime<Utc>, layout: &str) -> Option<String> {
    let spec = to_strftime(layout);
    let items: Vec<Item<'_>> = StrftimeItems::new(&spec).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    Some(at.format_with_items(items.iter()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_reference_layouts() {
        assert_eq!(to_strftime("2006-01-02"), "%Y-%m-%d");
        assert_eq!(to_strftime("20060102150405"), "%Y%m%d%H%M%S");
        assert_eq!(to_strftime("Jan 2006"), "%b %Y");
    }

    #[test]
    fn test_strftime_passthrough() {
        assert_eq!(to_strftime("%Y.%m"), "%Y.%m");
    }

    #[test]
    fn test_format_both_styles() {
        assert_eq!(format(&at(), "2006-01-02").as_deref(), Some("2024-03-09"));
        assert_eq!(format(&at(), "%Y/%m/%d").as_deref(), Some("2024/03/09"));
        assert_eq!(format(&at(), "15:04:05").as_deref(), Some("14:05:07"));
        assert_eq!(format(&at(), "Mon Jan").as_deref(), Some("Sat Mar"));
    }

    #[test]
    fn test_invalid_strftime_rejected() {
        assert_eq!(format(&at(), "%Q"), None);
    }
}
