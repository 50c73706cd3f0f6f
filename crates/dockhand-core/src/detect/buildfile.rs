//! Line-oriented build file parser.
//!
//! Recognises just enough of the Dockerfile grammar for planning: stages,
//! argument names, exposed ports and the health check. Everything else is
//! skipped.

use std::fmt;
use std::path::Path;

use crate::domain::{BuildFileInfo, Stage};

/// Build file parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse build file `content`. `path` is recorded as given.
pub fn parse(path: &Path, content: &str) -> Result<BuildFileInfo, ParseError> {
    let mut info = BuildFileInfo {
        path: path.to_path_buf(),
        ..Default::default()
    };

    for (line_num, line) in preprocess(content) {
        let (instruction, rest) = split_instruction(&line);
        match instruction.to_ascii_uppercase().as_str() {
            "FROM" => info.stages.push(parse_from(line_num, rest)?),
            "ARG" => {
                let name = rest
                    .split_whitespace()
                    .next()
                    .and_then(|decl| decl.split('=').next())
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| ParseError {
                        line: line_num,
                        message: "ARG requires a name".into(),
                    })?;
                if !info.declares_arg(name) {
                    info.args.push(name.to_string());
                }
            }
            "EXPOSE" => info
                .ports
                .extend(rest.split_whitespace().map(str::to_string)),
            "HEALTHCHECK" => {
                info.healthcheck = if rest.trim().eq_ignore_ascii_case("NONE") {
                    None
                } else {
                    Some(rest.trim().to_string())
                };
            }
            _ => {}
        }
    }

    Ok(info)
}

/// Join `\` continuations and drop comments and blank lines.
///
/// Returns `(first line number, joined text)` pairs; numbers are 1-based.
fn preprocess(content: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    let mut continuation = false;

    for (idx, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();

        // Comments and blank lines never end a continuation.
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let body = trimmed.strip_suffix('\\').unwrap_or(trimmed).trim();
        if continuation {
            if !body.is_empty() {
                current.push(' ');
                current.push_str(body);
            }
        } else {
            start = idx + 1;
            current = body.to_string();
        }

        continuation = trimmed.ends_with('\\');
        if !continuation && !current.is_empty() {
            out.push((start, std::mem::take(&mut current)));
        }
    }

    if !current.is_empty() {
        out.push((start, current));
    }
    out
}

fn split_instruction(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((instruction, rest)) => (instruction, rest.trim()),
        None => (line, ""),
    }
}

// FROM [--platform=<platform>] <image> [AS <name>]
fn parse_from(line_num: usize, rest: &str) -> Result<Stage, ParseError> {
    let mut platform = None;
    let mut words = Vec::new();

    for word in rest.split_whitespace() {
        if let Some(value) = word.strip_prefix("--platform=") {
            platform = Some(value.to_string());
        } else if word.starts_with("--") {
            continue;
        } else {
            words.push(word);
        }
    }

    let base = words.first().ok_or_else(|| ParseError {
        line: line_num,
        message: "FROM requires an image".into(),
    })?;

    let name = match words.as_slice() {
        [_, kw, alias, ..] if kw.eq_ignore_ascii_case("AS") => alias.to_string(),
        _ => String::new(),
    };

    Ok(Stage {
        name,
        base: base.to_string(),
        platform,
        line: line_num,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(content: &str) -> BuildFileInfo {
        parse(Path::new("Dockerfile"), content).unwrap()
    }

    #[test]
    fn test_multi_stage() {
        let info = parse_str(
            r#"# syntax=docker/dockerfile:1
ARG RUST_VERSION=1.80
FROM --platform=$BUILDPLATFORM rust:${RUST_VERSION} AS builder
ARG VERSION
RUN cargo build --release

from debian:bookworm-slim
COPY --from=builder /app /app
"#,
        );

        assert_eq!(info.stages.len(), 2);
        assert_eq!(info.stages[0].name, "builder");
        assert_eq!(info.stages[0].base, "rust:${RUST_VERSION}");
        assert_eq!(info.stages[0].platform.as_deref(), Some("$BUILDPLATFORM"));
        assert_eq!(info.stages[0].line, 3);
        assert_eq!(info.stages[1].name, "");
        assert_eq!(info.stages[1].base, "debian:bookworm-slim");
        assert_eq!(info.stages[1].line, 7);
        assert_eq!(info.args, vec!["RUST_VERSION", "VERSION"]);
    }

    #[test]
    fn test_ports_and_continuations() {
        let info = parse_str(
            "FROM alpine\nEXPOSE 8080 \\\n  9090/udp\nexpose 53\n",
        );
        assert_eq!(info.ports, vec!["8080", "9090/udp", "53"]);
    }

    #[test]
    fn test_healthcheck() {
        let info = parse_str("FROM alpine\nHEALTHCHECK --interval=5s CMD wget -q localhost\n");
        assert_eq!(
            info.healthcheck.as_deref(),
            Some("--interval=5s CMD wget -q localhost")
        );

        let disabled = parse_str("FROM alpine\nHEALTHCHECK NONE\n");
        assert_eq!(disabled.healthcheck, None);
    }

    #[test]
    fn test_continuation_keeps_first_line_number() {
        let info = parse_str("\n\nFROM \\\n  node:20 \\\n  AS web\n");
        assert_eq!(info.stages[0].line, 3);
        assert_eq!(info.stages[0].name, "web");
        assert_eq!(info.stages[0].base, "node:20");
    }

    #[test]
    fn test_blank_line_inside_continuation() {
        let info = parse_str("FROM alpine\nEXPOSE 8080 \\\n\n  9090\nEXPOSE 53\n");
        assert_eq!(info.ports, vec!["8080", "9090", "53"]);
    }

    #[test]
    fn test_duplicate_args_recorded_once() {
        let info = parse_str("ARG A\nFROM alpine\nARG A\nARG B=1\n");
        assert_eq!(info.args, vec!["A", "B"]);
    }

    #[test]
    fn test_errors_carry_line() {
        let err = parse(Path::new("Dockerfile"), "FROM alpine\n\nFROM\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.to_string().contains("FROM requires an image"));
    }
}
