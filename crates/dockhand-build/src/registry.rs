//! Registry credentials and the client abstraction used for login, push
//! and retention.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dockhand_core::domain::plan::registry_host;
use dockhand_core::{DockhandError, Environment, Provider, RegistryTarget, Result, RetentionPolicy};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::BuildEngine;
use crate::process;

/// Username and password read from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `<PREFIX>_USER` and `<PREFIX>_PASS`.
pub fn credential_vars(prefix: &str) -> (String, String) {
    (format!("{prefix}_USER"), format!("{prefix}_PASS"))
}

/// Credentials for `target`.
///
/// `Ok(None)` when the target names no credential prefix; a prefix whose
/// variables are unset is `MissingCredentials` listing each missing one.
pub fn resolve_credentials(
    target: &RegistryTarget,
    env: &dyn Environment,
) -> Result<Option<Credentials>> {
    let Some(prefix) = target.credentials.as_deref().filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    let (user_var, pass_var) = credential_vars(prefix);
    match (env.var(&user_var), env.var(&pass_var)) {
        (Some(username), Some(password)) => Ok(Some(Credentials { username, password })),
        (username, password) => {
            let mut vars = Vec::new();
            if username.is_none() {
                vars.push(user_var);
            }
            if password.is_none() {
                vars.push(pass_var);
            }
            Err(DockhandError::MissingCredentials {
                registry: target.repository(),
                vars,
            })
        }
    }
}

/// Registry operations, implemented per provider.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn login(
        &self,
        target: &RegistryTarget,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn push(&self, reference: &str, cancel: &CancellationToken) -> Result<()>;

    /// Prune old tags under `target` according to `policy`.
    async fn apply_retention(
        &self,
        target: &RegistryTarget,
        policy: &RetentionPolicy,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Client that shells out to the engine's `login` and `push`.
#[derive(Debug, Clone)]
pub struct CliRegistryClient {
    engine: BuildEngine,
    program: String,
}

impl CliRegistryClient {
    pub fn for_engine(engine: BuildEngine) -> Self {
        Self {
            engine,
            program: engine.program().to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl RegistryClient for CliRegistryClient {
    async fn login(
        &self,
        target: &RegistryTarget,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let host = registry_host(&target.url);
        info!(registry = %host, username = %credentials.username, "logging in");
        let args = self.engine.login_args(&host, &credentials.username);
        let mut command = Command::new(&self.program);
        command.args(&args);
        process::run(&mut command, Some(&credentials.password), cancel)
            .await?
            .into_result()
            .map(|_| ())
    }

    async fn push(&self, reference: &str, cancel: &CancellationToken) -> Result<()> {
        debug!(reference = %reference, "pushing");
        let mut command = Command::new(&self.program);
        command.args(self.engine.push_args(reference));
        process::run(&mut command, None, cancel)
            .await?
            .into_result()
            .map(|_| ())
    }

    async fn apply_retention(
        &self,
        target: &RegistryTarget,
        _policy: &RetentionPolicy,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        Err(DockhandError::Config(format!(
            "retention for {} needs a {} API client",
            target.repository(),
            target.provider
        )))
    }
}

/// Registry clients keyed by provider, with a fallback for the rest.
#[derive(Clone)]
pub struct RegistryClients {
    default: Arc<dyn RegistryClient>,
    by_provider: HashMap<Provider, Arc<dyn RegistryClient>>,
}

impl RegistryClients {
    pub fn new(default: Arc<dyn RegistryClient>) -> Self {
        Self {
            default,
            by_provider: HashMap::new(),
        }
    }

    /// Route `provider` to `client`.
    pub fn with(mut self, provider: Provider, client: Arc<dyn RegistryClient>) -> Self {
        self.by_provider.insert(provider, client);
        self
    }

    pub fn get(&self, provider: Provider) -> &dyn RegistryClient {
        &**self.by_provider.get(&provider).unwrap_or(&self.default)
    }
}

impl fmt::Debug for RegistryClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryClients")
            .field("providers", &self.by_provider.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
