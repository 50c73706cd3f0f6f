//! Reconstructs layer events from the builder's plain progress output.
//!
//! The plain format is line-oriented and keyed by the builder's own step
//! number:
//!
//! ```text
//! #5 [build 2/5] RUN cargo build --release
//! #5 0.412 Compiling app v0.1.0
//! #5 DONE 41.3s
//! #6 [runtime 1/2] COPY --from=build /app /app
//! #6 CACHED
//! ```
//!
//! Only steps that reach `DONE` or `CACHED` produce events.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use dockhand_core::LayerEvent;
use once_cell::sync::Lazy;
use regex::Regex;

const DETAIL_LIMIT: usize = 60;

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(\d+) \[(?:(.+?) )?(\d+/\d+)\] (.*)$").expect("header pattern is valid")
});

static UNCOUNTED_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#(\d+) \[[^\]]*\]").expect("uncounted pattern is valid"));

static DONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(\d+) DONE (\d+(?:[.,]\d+)?)s$").expect("done pattern is valid")
});

static CACHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#(\d+) CACHED$").expect("cached pattern is valid"));

static DIGEST_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@sha256:[0-9a-fA-F]+$").expect("digest pattern is valid"));

#[derive(Debug, Clone, Default)]
struct StepState {
    stage: String,
    counter: String,
    instruction: String,
    detail: String,
    image: Option<String>,
    cached: bool,
    duration: Duration,
    done: bool,
}

/// Incremental parser; feed lines as they arrive, then call [`finish`].
///
/// [`finish`]: LayerLogParser::finish
#[derive(Debug, Default)]
pub struct LayerLogParser {
    steps: BTreeMap<u32, StepState>,
    /// Internal and auth steps (`#N [internal] ...`).
    ignored: BTreeSet<u32>,
}

impl LayerLogParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, text: &str) {
        for line in text.lines() {
            self.feed_line(line);
        }
    }

    pub fn feed_line(&mut self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']).trim_start();
        if !line.starts_with('#') {
            return;
        }

        if let Some(caps) = HEADER.captures(line) {
            let Some(id) = parse_id(&caps[1]) else {
                return;
            };
            self.ignored.remove(&id);
            let (instruction, detail) = split_instruction(&caps[4]);
            let image = (instruction == "FROM").then(|| base_image(&detail)).flatten();
            self.steps.insert(
                id,
                StepState {
                    stage: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
                    counter: caps[3].to_string(),
                    instruction,
                    detail: truncate(&detail, DETAIL_LIMIT),
                    image,
                    ..Default::default()
                },
            );
            return;
        }

        if let Some(caps) = UNCOUNTED_HEADER.captures(line) {
            if let Some(id) = parse_id(&caps[1]) {
                self.steps.remove(&id);
                self.ignored.insert(id);
            }
            return;
        }

        if let Some(caps) = CACHED.captures(line) {
            if let Some(state) = parse_id(&caps[1]).and_then(|id| self.steps.get_mut(&id)) {
                state.cached = true;
                state.duration = Duration::ZERO;
                state.done = true;
            }
            return;
        }

        if let Some(caps) = DONE.captures(line) {
            if let Some(state) = parse_id(&caps[1]).and_then(|id| self.steps.get_mut(&id)) {
                state.done = true;
                if !state.cached {
                    state.duration = parse_seconds(&caps[2]);
                }
            }
        }
    }

    /// Completed steps so far, in step-number order.
    pub fn completed(&self) -> Vec<LayerEvent> {
        self.steps
            .iter()
            .filter(|(id, state)| state.done && !self.ignored.contains(id))
            .map(|(id, state)| LayerEvent {
                id: *id,
                stage: state.stage.clone(),
                step: state.counter.clone(),
                instruction: state.instruction.clone(),
                detail: state.detail.clone(),
                cached: state.cached,
                duration: state.duration,
                image: state.image.clone(),
            })
            .collect()
    }

    pub fn finish(self) -> Vec<LayerEvent> {
        self.completed()
    }
}

/// Parse a complete captured stream.
pub fn parse_layers(text: &str) -> Vec<LayerEvent> {
    let mut parser = LayerLogParser::new();
    parser.feed(text);
    parser.finish()
}

fn parse_id(raw: &str) -> Option<u32> {
    raw.parse().ok()
}

fn parse_seconds(raw: &str) -> Duration {
    raw.replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or_default()
}

fn split_instruction(text: &str) -> (String, String) {
    let text = text.trim();
    match text.split_once(char::is_whitespace) {
        Some((kw, rest)) => (kw.to_ascii_uppercase(), rest.trim().to_string()),
        None => (text.to_ascii_uppercase(), String::new()),
    }
}

/// Base image from a `FROM` detail: drops an `AS alias` clause and a
/// trailing digest.
fn base_image(detail: &str) -> Option<String> {
    let words: Vec<&str> = detail.split_whitespace().collect();
    let end = words
        .iter()
        .position(|w| w.eq_ignore_ascii_case("AS"))
        .unwrap_or(words.len());
    let image = words[..end]
        .iter()
        .find(|w| !w.starts_with("--"))
        .copied()?;
    let image = DIGEST_SUFFIX.replace(image, "");
    Some(image.into_owned()).filter(|i| !i.is_empty())
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
#0 building with \"default\" instance using docker driver

#1 [internal] load build definition from Dockerfile
#1 transferring dockerfile: 412B done
#1 DONE 0.0s

#2 [internal] load metadata for docker.io/library/rust:1.80
#2 DONE 1.1s

#3 [auth] library/rust:pull token for registry-1.docker.io
#3 DONE 0.0s

#4 [build 1/3] FROM docker.io/library/rust:1.80@sha256:0123abcd
#4 resolve docker.io/library/rust:1.80@sha256:0123abcd done
#4 DONE 0.2s

#5 [build 2/3] RUN cargo fetch
#5 CACHED

#6 [build 3/3] RUN cargo build --release --locked --features full,metrics,tracing,extra-long-feature
#6 0.512    Compiling app v0.1.0
#6 DONE 41.3s

#7 [runtime 1/1] COPY --from=build /app/target/release/app /usr/local/bin/app
#7 ERROR: failed to compute cache key
";

    #[test]
    fn test_sample_stream() {
        let layers = parse_layers(SAMPLE);
        assert_eq!(layers.iter().map(|l| l.id).collect::<Vec<_>>(), vec![4, 5, 6]);

        let from = &layers[0];
        assert_eq!(from.stage, "build");
        assert_eq!(from.step, "1/3");
        assert_eq!(from.instruction, "FROM");
        assert_eq!(from.image.as_deref(), Some("docker.io/library/rust:1.80"));
        assert_eq!(from.duration, Duration::from_millis(200));

        let cached = &layers[1];
        assert!(cached.cached);
        assert_eq!(cached.duration, Duration::ZERO);
        assert_eq!(cached.image, None);

        let run = &layers[2];
        assert!(!run.cached);
        assert_eq!(run.duration, Duration::from_secs_f64(41.3));
        assert!(run.detail.ends_with('…'));
        assert_eq!(run.detail.chars().count(), DETAIL_LIMIT + 1);
    }

    #[test]
    fn test_single_step_done() {
        let layers = parse_layers("#3 [build 2/5] RUN apt-get install -y curl\n#3 DONE 4.2s\n");
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].id, 3);
        assert_eq!(layers[0].instruction, "RUN");
        assert_eq!(layers[0].detail, "apt-get install -y curl");
        assert!(layers[0].duration > Duration::ZERO);
        assert!(!layers[0].cached);
    }

    #[test]
    fn test_unfinished_step_produces_nothing() {
        assert!(parse_layers("#3 [build 2/5] RUN make\n#3 0.1 make: *** Error 2\n").is_empty());
    }

    #[test]
    fn test_anonymous_stage_and_alias() {
        let layers = parse_layers("#2 [1/2] FROM alpine:3.19 AS base\n#2 DONE 0.0s\n");
        assert_eq!(layers[0].stage, "");
        assert_eq!(layers[0].image.as_deref(), Some("alpine:3.19"));
    }

    #[test]
    fn test_platform_prefixed_stage() {
        let layers =
            parse_layers("#9 [linux/arm64 build 2/4] RUN go build ./...\n#9 DONE 12.0s\n");
        assert_eq!(layers[0].stage, "linux/arm64 build");
        assert_eq!(layers[0].step, "2/4");
    }

    #[test]
    fn test_comma_decimal_duration() {
        let layers = parse_layers("#4 [2/3] COPY . .\n#4 DONE 1,5s\n");
        assert_eq!(layers[0].duration, Duration::from_millis(1500));
    }

    #[test]
    fn test_header_overwrites_state() {
        let mut parser = LayerLogParser::new();
        parser.feed_line("#4 [1/2] RUN first");
        parser.feed_line("#4 DONE 1.0s");
        parser.feed_line("#4 [2/2] RUN second");
        assert!(parser.completed().is_empty());
        parser.feed_line("#4 CACHED");
        let layers = parser.finish();
        assert_eq!(layers[0].detail, "second");
        assert!(layers[0].cached);
    }

    #[test]
    fn test_crlf_and_noise() {
        let layers = parse_layers("noise\r\n#5 [1/1] RUN true\r\n#5 DONE 0.1s\r\n");
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn test_truncate_is_char_safe() {
        let text = "é".repeat(70);
        let out = truncate(&text, 60);
        assert_eq!(out.chars().count(), 61);
    }
}
