//! CI platform context probing.
//!
//! Each logical field is resolved by walking a fixed, ordered list of
//! environment variables across the supported CI platforms and taking the
//! first non-empty value.

use crate::env::{first_var, Environment};

/// Logical CI context fields exposed to templates as `{ci:<field>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiField {
    Pipeline,
    Runner,
    Job,
    Url,
}

impl CiField {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pipeline" => Some(CiField::Pipeline),
            "runner" => Some(CiField::Runner),
            "job" => Some(CiField::Job),
            "url" => Some(CiField::Url),
            _ => None,
        }
    }

    /// Probe order: GitHub, GitLab, Buildkite, CircleCI, Azure, Bitbucket, Jenkins.
    pub fn candidates(&self) -> &'static [&'static str] {
        match self {
            CiField::Pipeline => &[
                "GITHUB_RUN_ID",
                "CI_PIPELINE_ID",
                "BUILDKITE_BUILD_NUMBER",
                "CIRCLE_BUILD_NUM",
                "BUILD_BUILDID",
                "BITBUCKET_BUILD_NUMBER",
                "BUILD_NUMBER",
            ],
            CiField::Runner => &[
                "RUNNER_NAME",
                "CI_RUNNER_DESCRIPTION",
                "BUILDKITE_AGENT_NAME",
                "CIRCLE_NODE_INDEX",
                "AGENT_NAME",
                "BITBUCKET_STEP_RUN_NUMBER",
                "NODE_NAME",
            ],
            CiField::Job => &[
                "GITHUB_JOB",
                "CI_JOB_ID",
                "BUILDKITE_JOB_ID",
                "CIRCLE_JOB",
                "SYSTEM_JOBID",
                "BITBUCKET_STEP_UUID",
                "JOB_NAME",
            ],
            CiField::Url => &[
                "CI_PIPELINE_URL",
                "BUILDKITE_BUILD_URL",
                "CIRCLE_BUILD_URL",
                "BUILD_URL",
            ],
        }
    }
}

/// Resolve a CI field, or `None` outside CI.
pub fn ci_value(field: CiField, env: &dyn Environment) -> Option<String> {
    if field == CiField::Url {
        if let Some(url) = github_run_url(env) {
            return Some(url);
        }
    }
    first_var(env, field.candidates())
}

fn github_run_url(env: &dyn Environment) -> Option<String> {
    let server = env.var("GITHUB_SERVER_URL")?;
    let repo = env.var("GITHUB_REPOSITORY")?;
    let run = env.var("GITHUB_RUN_ID")?;
    Some(format!(
        "{}/{}/actions/runs/{}",
        server.trim_end_matches('/'),
        repo,
        run
    ))
}

/// Branch name as reported by the CI platform.
pub fn ci_branch(env: &dyn Environment) -> Option<String> {
    if env.var("GITHUB_REF_TYPE").as_deref() == Some("branch") {
        if let Some(name) = env.var("GITHUB_REF_NAME") {
            return Some(name);
        }
    }
    first_var(
        env,
        &[
            "GITHUB_HEAD_REF",
            "CI_COMMIT_BRANCH",
            "BUILDKITE_BRANCH",
            "CIRCLE_BRANCH",
            "BUILD_SOURCEBRANCHNAME",
            "BITBUCKET_BRANCH",
            "BRANCH_NAME",
        ],
    )
}

/// Tag being built, as reported by the CI platform.
pub fn ci_tag(env: &dyn Environment) -> Option<String> {
    if env.var("GITHUB_REF_TYPE").as_deref() == Some("tag") {
        if let Some(name) = env.var("GITHUB_REF_NAME") {
            return Some(name);
        }
    }
    first_var(
        env,
        &[
            "CI_COMMIT_TAG",
            "BUILDKITE_TAG",
            "CIRCLE_TAG",
            "BITBUCKET_TAG",
            "TAG_NAME",
        ],
    )
}
