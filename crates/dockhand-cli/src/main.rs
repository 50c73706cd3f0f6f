//! Dockhand CLI
//!
//! The `dockhand` command detects, versions, plans and builds container
//! images for the repository it is pointed at.
//!
//! ## Commands
//!
//! - `detect`: Show build files, language and git metadata
//! - `version`: Show the version derived from git
//! - `plan`: Show the build plan as JSON
//! - `build`: Execute the build plan

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dockhand_build::{BuildEngine, BuilderDriver, CliRegistryClient, Executor, RegistryClients};
use dockhand_core::telemetry::{init_tracing, level_for_verbosity};
use dockhand_core::{
    detect, BuildPlan, BuildResult, Config, Detection, GitProbe, PlanAssembler, PlanRequest,
    ProcessEnv, StepResult, VersionDetector, VersionInfo,
};

#[derive(Parser)]
#[command(name = "dockhand")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Declarative container image builds driven by git", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what the repository contains
    Detect {
        #[command(flatten)]
        repo: RepoArgs,
    },

    /// Show the version derived from git tags
    Version {
        #[command(flatten)]
        repo: RepoArgs,

        /// Only consider tags under `<scope>/`
        #[arg(long)]
        scope: Option<String>,
    },

    /// Assemble and print the build plan
    Plan {
        #[command(flatten)]
        repo: RepoArgs,

        #[command(flatten)]
        select: SelectArgs,
    },

    /// Build, push and save images
    Build {
        #[command(flatten)]
        repo: RepoArgs,

        #[command(flatten)]
        select: SelectArgs,

        /// Echo builder progress while building
        #[arg(long)]
        stream: bool,

        /// Build engine: buildx or nerdctl
        #[arg(long, env = "DOCKHAND_ENGINE", default_value = "buildx")]
        engine: BuildEngine,
    },
}

#[derive(Args)]
struct RepoArgs {
    /// Repository root
    #[arg(long, env = "DOCKHAND_ROOT", default_value = ".")]
    root: PathBuf,

    /// Configuration file (default: dockhand.toml or .dockhand.toml in the root)
    #[arg(long, env = "DOCKHAND_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct SelectArgs {
    /// Build id to include; repeat for several (default: all)
    #[arg(long = "build", value_name = "ID")]
    builds: Vec<String>,

    /// Load images locally and never push
    #[arg(long)]
    local: bool,
}

impl SelectArgs {
    fn request(&self) -> PlanRequest {
        PlanRequest {
            builds: self.builds.clone(),
            local: self.local,
        }
    }
}

/// Everything read from the repository before planning.
struct Workspace {
    detection: Detection,
    version: VersionInfo,
    config: Config,
}

impl Workspace {
    fn load(repo: &RepoArgs) -> Result<Self> {
        let root = canonical_root(&repo.root)?;
        let config = match &repo.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => Config::discover(&root).context("Failed to load configuration")?,
        };
        let detection = detect(&root);
        let version = VersionDetector::new(&root, &ProcessEnv)
            .detect()
            .context("Failed to derive version from git")?;
        Ok(Self {
            detection,
            version,
            config,
        })
    }

    fn plan(&self, request: &PlanRequest) -> Result<BuildPlan> {
        let probe = GitProbe::new(&self.detection.root, &ProcessEnv);
        PlanAssembler::new(&self.detection, &self.version, &self.config, &ProcessEnv)
            .with_repo(&probe)
            .assemble(request)
            .context("Failed to assemble build plan")
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(root)
        .with_context(|| format!("Repository root {} is not accessible", root.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.json, level_for_verbosity(cli.verbose));

    match cli.command {
        Commands::Detect { repo } => cmd_detect(&repo),
        Commands::Version { repo, scope } => cmd_version(&repo, scope.as_deref()),
        Commands::Plan { repo, select } => cmd_plan(&repo, &select),
        Commands::Build {
            repo,
            select,
            stream,
            engine,
        } => cmd_build(&repo, &select, stream, engine).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_detect(repo: &RepoArgs) -> Result<()> {
    let root = canonical_root(&repo.root)?;
    print_json(&detect(&root))
}

fn cmd_version(repo: &RepoArgs, scope: Option<&str>) -> Result<()> {
    let root = canonical_root(&repo.root)?;
    let detector = VersionDetector::new(&root, &ProcessEnv);
    let detector = match scope {
        Some(scope) => detector.scoped(scope),
        None => detector,
    };
    let version = detector
        .detect()
        .context("Failed to derive version from git")?;
    print_json(&version)
}

fn cmd_plan(repo: &RepoArgs, select: &SelectArgs) -> Result<()> {
    let workspace = Workspace::load(repo)?;
    let plan = workspace.plan(&select.request())?;
    print_json(&plan)
}

async fn cmd_build(
    repo: &RepoArgs,
    select: &SelectArgs,
    stream: bool,
    engine: BuildEngine,
) -> Result<()> {
    let workspace = Workspace::load(repo)?;
    let plan = workspace.plan(&select.request())?;
    if plan.steps.is_empty() {
        println!("Nothing to build.");
        return Ok(());
    }

    println!(
        "Building {} step(s) for {} with {}",
        plan.steps.len(),
        workspace.version.version,
        engine
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling build");
            on_signal.cancel();
        }
    });

    let executor = Executor::new(
        BuilderDriver::new(engine),
        RegistryClients::new(Arc::new(CliRegistryClient::for_engine(engine))),
        Arc::new(ProcessEnv),
    )
    .streaming(stream);

    let result = executor
        .execute(&plan, &cancel)
        .await
        .context("Build aborted")?;

    print!("{}", render_summary(&result));
    if result.success() {
        info!(steps = result.steps.len(), "build succeeded");
        Ok(())
    } else {
        anyhow::bail!("Build failed")
    }
}

fn render_step(step: &StepResult) -> String {
    let mark = if step.passed() { "✓" } else { "✗" };
    let mut out = format!(
        "  {} {} [{}] ({}ms, {} layer(s))\n",
        mark,
        step.id,
        step.status,
        step.elapsed.as_millis(),
        step.layers.len()
    );
    for reference in &step.pushed {
        out.push_str(&format!("      pushed {reference}\n"));
    }
    for artifact in &step.artifacts {
        out.push_str(&format!("      wrote {}\n", artifact.display()));
    }
    if let Some(error) = &step.error {
        out.push_str(&format!("      {error}\n"));
    }
    out
}

fn render_summary(result: &BuildResult) -> String {
    let mut out = String::from("\n");
    for step in &result.steps {
        out.push_str(&render_step(step));
    }
    out.push_str(&format!(
        "\nSummary: {}/{} steps passed in {}ms\n",
        result.passed_count(),
        result.steps.len(),
        result.elapsed.as_millis()
    ));
    out
}
