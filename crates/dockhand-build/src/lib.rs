//! Dockhand Build - drives the external image builder
//!
//! Takes a [`BuildPlan`](dockhand_core::BuildPlan) from `dockhand-core` and:
//! - Runs each step through `docker buildx` or `nerdctl`
//! - Reconstructs layer events from plain progress output
//! - Logs in, pushes, saves and applies retention per registry target

pub mod driver;
pub mod engine;
pub mod executor;
pub mod process;
pub mod progress;
pub mod registry;

// Re-export key types
pub use driver::BuilderDriver;
pub use engine::BuildEngine;
pub use executor::Executor;
pub use process::ProcessOutput;
pub use progress::{parse_layers, LayerLogParser};
pub use registry::{
    resolve_credentials, CliRegistryClient, Credentials, RegistryClient, RegistryClients,
};
