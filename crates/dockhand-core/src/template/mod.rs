//! Template expansion for tags, registry paths and build arguments.
//!
//! Templates are plain strings with `{token}` placeholders. Token classes are
//! resolved in the fixed order given by [`RESOLUTION_ORDER`]; parameterised
//! and longer forms run before the bare forms they could be mistaken for.
//! Resolution never fails: unknown tokens are left as written, and known
//! tokens with nothing to resolve to become empty.
//!
//! # Example
//!
//! ```
//! use dockhand_core::domain::VersionInfo;
//! use dockhand_core::env::ProcessEnv;
//! use dockhand_core::template::TemplateContext;
//!
//! let version = VersionInfo {
//!     version: "1.2.3".into(),
//!     major: "1".into(),
//!     ..Default::default()
//! };
//! let ctx = TemplateContext::new(&version, &ProcessEnv);
//! assert_eq!(ctx.resolve("app:{version}-{unknown}"), "app:1.2.3-{unknown}");
//! ```

pub mod layout;
pub mod probe;
mod random;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::ci::{ci_value, CiField};
use crate::domain::VersionInfo;
use crate::env::Environment;

pub use probe::{repo_name_from_url, GitProbe, RepoProbe};

const DEFAULT_SHA_LEN: usize = 7;
const DEFAULT_RAND_LEN: usize = 6;
const DEFAULT_RANDHEX_LEN: usize = 8;
const MAX_RANDOM_LEN: usize = 64;

/// Token classes understood by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    /// `{var:name}`
    UserVar,
    /// `{version:scope}`, `{major:scope}`, ...
    ScopedVersion,
    /// `{commit_date}`, `{commit_date:FORMAT}`
    CommitDate,
    /// `{project}`, `{project:name}`, `{project:description}`
    Project,
    /// `{env:NAME}`
    Env,
    /// `{sha:N}`
    ShortSha,
    /// `{randhex}`, `{randhex:N}`
    RandomHex,
    /// `{rand}`, `{rand:N}`
    RandomDigits,
    /// `{date:FORMAT}`
    DateFormat,
    /// `{datetime}`
    DateTime,
    /// `{timestamp}`
    Timestamp,
    /// `{date}`
    Date,
    /// `{ci:pipeline}`, `{ci:runner}`, `{ci:job}`, `{ci:url}`
    Ci,
    /// `{version}`, `{base}`, `{major}`, `{minor}`, `{patch}`,
    /// `{prerelease}`, `{branch}`, `{sha}`
    Version,
}

/// Order in which token classes are resolved.
pub const RESOLUTION_ORDER: [TokenClass; 14] = [
    TokenClass::UserVar,
    TokenClass::ScopedVersion,
    TokenClass::CommitDate,
    TokenClass::Project,
    TokenClass::Env,
    TokenClass::ShortSha,
    TokenClass::RandomHex,
    TokenClass::RandomDigits,
    TokenClass::DateFormat,
    TokenClass::DateTime,
    TokenClass::Timestamp,
    TokenClass::Date,
    TokenClass::Ci,
    TokenClass::Version,
];

macro_rules! token_regex {
    ($name:ident, $pattern:expr) => {
        static $name: Lazy<Regex> =
            Lazy::new(|| Regex::new($pattern).expect("token pattern should compile"));
    };
}

token_regex!(USER_VAR, r"\{var:([A-Za-z0-9_.-]+)\}");
token_regex!(
    SCOPED_VERSION,
    r"\{(version|base|major|minor|patch|prerelease):([A-Za-z][A-Za-z0-9._/-]*)\}"
);
token_regex!(COMMIT_DATE, r"\{commit_date(?::([^{}]+))?\}");
token_regex!(PROJECT, r"\{project(?::(name|description))?\}");
token_regex!(ENV, r"\{env:([A-Za-z_][A-Za-z0-9_]*)\}");
token_regex!(SHORT_SHA, r"\{sha:(\d+)\}");
token_regex!(RANDOM_HEX, r"\{randhex(?::(\d+))?\}");
token_regex!(RANDOM_DIGITS, r"\{rand(?::(\d+))?\}");
token_regex!(DATE_FORMAT, r"\{date:([^{}]+)\}");
token_regex!(DATE_TIME, r"\{datetime\}");
token_regex!(TIMESTAMP, r"\{timestamp\}");
token_regex!(DATE, r"\{date\}");
token_regex!(CI, r"\{ci:(pipeline|runner|job|url)\}");
token_regex!(
    VERSION,
    r"\{(version|base|major|minor|patch|prerelease|branch|sha)\}"
);

impl TokenClass {
    pub fn pattern(&self) -> &'static Regex {
        match self {
            TokenClass::UserVar => &USER_VAR,
            TokenClass::ScopedVersion => &SCOPED_VERSION,
            TokenClass::CommitDate => &COMMIT_DATE,
            TokenClass::Project => &PROJECT,
            TokenClass::Env => &ENV,
            TokenClass::ShortSha => &SHORT_SHA,
            TokenClass::RandomHex => &RANDOM_HEX,
            TokenClass::RandomDigits => &RANDOM_DIGITS,
            TokenClass::DateFormat => &DATE_FORMAT,
            TokenClass::DateTime => &DATE_TIME,
            TokenClass::Timestamp => &TIMESTAMP,
            TokenClass::Date => &DATE,
            TokenClass::Ci => &CI,
            TokenClass::Version => &VERSION,
        }
    }
}

/// Project metadata exposed as `{project}` and `{project:description}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProjectInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Inputs for one resolution.
pub struct TemplateContext<'a> {
    version: &'a VersionInfo,
    env: &'a dyn Environment,
    vars: Option<&'a BTreeMap<String, String>>,
    repo: Option<&'a dyn RepoProbe>,
    project: Option<&'a ProjectInfo>,
    now: DateTime<Utc>,
}

impl<'a> TemplateContext<'a> {
    pub fn new(version: &'a VersionInfo, env: &'a dyn Environment) -> Self {
        Self {
            version,
            env,
            vars: None,
            repo: None,
            project: None,
            now: Utc::now(),
        }
    }

    pub fn with_vars(mut self, vars: &'a BTreeMap<String, String>) -> Self {
        self.vars = Some(vars);
        self
    }

    /// Enables scoped-version, commit-date and project-name lookups.
    pub fn with_repo(mut self, repo: &'a dyn RepoProbe) -> Self {
        self.repo = Some(repo);
        self
    }

    pub fn with_project(mut self, project: &'a ProjectInfo) -> Self {
        self.project = Some(project);
        self
    }

    /// Pin the clock used by date tokens.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn resolve(&self, template: &str) -> String {
        resolve(template, self)
    }
}

/// Expand every known token in `template`.
pub fn resolve(template: &str, ctx: &TemplateContext<'_>) -> String {
    if !template.contains('{') {
        return template.to_string();
    }

    let mut pass = Pass {
        ctx,
        scoped: HashMap::new(),
        commit_date: None,
    };
    RESOLUTION_ORDER
        .iter()
        .fold(template.to_string(), |acc, class| pass.apply(*class, &acc))
}

/// State for a single resolution; caches lookups that shell out.
struct Pass<'c, 'a> {
    ctx: &'c TemplateContext<'a>,
    scoped: HashMap<String, Option<VersionInfo>>,
    commit_date: Option<Option<DateTime<Utc>>>,
}

impl Pass<'_, '_> {
    fn apply(&mut self, class: TokenClass, input: &str) -> String {
        let re = class.pattern();
        if !re.is_match(input) {
            return input.to_string();
        }

        if class == TokenClass::UserVar {
            return match self.ctx.vars {
                Some(vars) => expand_vars(input, vars, &mut Vec::new()),
                None => input.to_string(),
            };
        }

        re.replace_all(input, |caps: &Captures<'_>| self.replace(class, caps))
            .into_owned()
    }

    fn replace(&mut self, class: TokenClass, caps: &Captures<'_>) -> String {
        let ctx = self.ctx;
        let token = caps[0].to_string();
        let width = |default: usize| -> Option<usize> {
            match caps.get(1) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(default),
            }
        };

        match class {
            TokenClass::UserVar => token,
            TokenClass::ScopedVersion => {
                if ctx.repo.is_none() {
                    return token;
                }
                match self.scoped_version(&caps[2]) {
                    Some(info) => version_field(&info, &caps[1]).unwrap_or(token),
                    None => String::new(),
                }
            }
            TokenClass::CommitDate => {
                if ctx.repo.is_none() {
                    return token;
                }
                let Some(date) = self.commit_date() else {
                    return String::new();
                };
                let format = caps.get(1).map_or("%Y%m%d", |m| m.as_str());
                layout::format(&date, format).unwrap_or(token)
            }
            TokenClass::Project => match caps.get(1).map(|m| m.as_str()) {
                Some("description") => ctx
                    .project
                    .map(|p| p.description.clone())
                    .unwrap_or_default(),
                _ => ctx
                    .project
                    .map(|p| p.name.clone())
                    .filter(|n| !n.is_empty())
                    .or_else(|| ctx.repo.and_then(|r| r.project_name()))
                    .unwrap_or_default(),
            },
            TokenClass::Env => ctx.env.var(&caps[1]).unwrap_or_default(),
            TokenClass::ShortSha => match width(DEFAULT_SHA_LEN) {
                Some(n) => {
                    let full = if ctx.version.commit.is_empty() {
                        &ctx.version.sha
                    } else {
                        &ctx.version.commit
                    };
                    full.chars().take(n).collect()
                }
                None => token,
            },
            TokenClass::RandomHex => match width(DEFAULT_RANDHEX_LEN) {
                Some(n) => random::hex_digits(n.min(MAX_RANDOM_LEN)),
                None => token,
            },
            TokenClass::RandomDigits => match width(DEFAULT_RAND_LEN) {
                Some(n) => random::digits(n.min(MAX_RANDOM_LEN)),
                None => token,
            },
            TokenClass::DateFormat => layout::format(&ctx.now, &caps[1]).unwrap_or(token),
            TokenClass::DateTime => ctx.now.format("%Y%m%d%H%M%S").to_string(),
            TokenClass::Timestamp => ctx.now.timestamp().to_string(),
            TokenClass::Date => ctx.now.format("%Y%m%d").to_string(),
            TokenClass::Ci => CiField::from_name(&caps[1])
                .and_then(|field| ci_value(field, ctx.env))
                .unwrap_or_default(),
            TokenClass::Version => version_field(ctx.version, &caps[1]).unwrap_or(token),
        }
    }

    fn scoped_version(&mut self, scope: &str) -> Option<VersionInfo> {
        if let Some(cached) = self.scoped.get(scope) {
            return cached.clone();
        }
        let info = self.ctx.repo.and_then(|r| r.scoped_version(scope));
        self.scoped.insert(scope.to_string(), info.clone());
        info
    }

    fn commit_date(&mut self) -> Option<DateTime<Utc>> {
        if let Some(cached) = self.commit_date {
            return cached;
        }
        let date = self.ctx.repo.and_then(|r| r.commit_date());
        self.commit_date = Some(date);
        date
    }
}

fn version_field(info: &VersionInfo, field: &str) -> Option<String> {
    let value = match field {
        "version" => info.version.clone(),
        "base" => info.base.clone(),
        "major" => info.major.clone(),
        "minor" => info.minor.clone(),
        "patch" => info.patch.clone(),
        "prerelease" => info.prerelease.clone(),
        "branch" => info.sanitized_branch(),
        "sha" => info.sha.chars().take(DEFAULT_SHA_LEN).collect(),
        _ => return None,
    };
    Some(value)
}

/// Expand `{var:name}` recursively. A name already being expanded is left
/// untouched, which breaks reference cycles.
fn expand_vars(input: &str, vars: &BTreeMap<String, String>, active: &mut Vec<String>) -> String {
    USER_VAR
        .replace_all(input, |caps: &Captures<'_>| {
            let name = &caps[1];
            if active.iter().any(|a| a == name) {
                return caps[0].to_string();
            }
            match vars.get(name) {
                Some(value) => {
                    active.push(name.to_string());
                    let expanded = expand_vars(value, vars, active);
                    active.pop();
                    expanded
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
