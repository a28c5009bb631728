//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands};
use crate::engine::{Input, SourceConfig};
use crate::loader::{load_sources_from_file_with, Interpolation};
use crate::metrics::InputMetrics;
use crate::publisher::{Publisher, StdoutPublisher};
use crate::state::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use anyhow::{bail, Context};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> anyhow::Result<()> {
        match &self.cli.command {
            Commands::Run { config, state } => {
                let sources = self.load(config)?;
                let store = open_store(state.as_deref()).await?;
                self.poll(sources, store).await
            }
            Commands::Once { config, state } => {
                let sources = self.load(config)?;
                let store = open_store(state.as_deref()).await?;
                self.once(sources, store).await
            }
            Commands::Validate { config } => {
                let sources = self.load(config)?;
                for source in &sources {
                    println!(
                        "{}: ok ({} chain step(s), every {:?})",
                        source.id,
                        source.chain.len(),
                        source.interval
                    );
                }
                Ok(())
            }
        }
    }

    fn load(&self, path: &Path) -> anyhow::Result<Vec<SourceConfig>> {
        let interpolation = overrides(Interpolation::from_env(), &self.cli.set)?;
        load_sources_from_file_with(path, &interpolation)
            .with_context(|| format!("failed to load {}", path.display()))
    }

    async fn poll(
        &self,
        sources: Vec<SourceConfig>,
        store: Arc<dyn CheckpointStore>,
    ) -> anyhow::Result<()> {
        let publisher: Arc<dyn Publisher> = Arc::new(StdoutPublisher::new());
        let metrics = Arc::new(InputMetrics::new()?);
        let cancel = CancellationToken::new();

        let shutdown = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                shutdown.cancel();
            }
        });

        let mut workers = JoinSet::new();
        for source in sources {
            let mut input = Input::new(source, store.clone(), publisher.clone())?
                .with_metrics(metrics.clone());
            let cancel = cancel.clone();
            workers.spawn(async move { input.run(cancel).await });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "input stopped with error"),
                Err(e) => error!(error = %e, "input task failed"),
            }
        }
        info!(metrics = ?metrics.snapshot(), "all inputs stopped");
        debug!("final metrics:\n{}", metrics.gather());
        Ok(())
    }

    async fn once(
        &self,
        sources: Vec<SourceConfig>,
        store: Arc<dyn CheckpointStore>,
    ) -> anyhow::Result<()> {
        let publisher: Arc<dyn Publisher> = Arc::new(StdoutPublisher::new());
        let cancel = CancellationToken::new();
        let mut failed = 0;

        for source in sources {
            let mut input = Input::new(source, store.clone(), publisher.clone())?;
            match input.run_once(&cancel).await {
                Ok(stats) => info!(
                    id = input.id(),
                    events = stats.events_published,
                    pages = stats.pages,
                    "interval finished"
                ),
                Err(e) => {
                    failed += 1;
                    error!(id = input.id(), error = %e, "interval failed");
                }
            }
        }

        if failed > 0 {
            bail!("{failed} source(s) failed");
        }
        Ok(())
    }
}

async fn open_store(path: Option<&Path>) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    Ok(match path {
        Some(path) => Arc::new(
            FileCheckpointStore::open(path)
                .await
                .with_context(|| format!("failed to open checkpoint file {}", path.display()))?,
        ),
        None => Arc::new(MemoryCheckpointStore::new()),
    })
}

/// Apply `--set key=value` overrides; values are read as YAML scalars
fn overrides(mut interpolation: Interpolation, pairs: &[String]) -> anyhow::Result<Interpolation> {
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("invalid --set {pair:?}, expected KEY=VALUE");
        };
        let value = serde_yaml::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        interpolation = interpolation.with_config_value(key.trim(), value);
    }
    Ok(interpolation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overrides_parse_scalars() {
        let interpolation = overrides(
            Interpolation::new(),
            &["host=api.test".to_string(), "limit=10".to_string(), "auth.user=bob".to_string()],
        )
        .unwrap();
        assert_eq!(interpolation.get("config.host"), Some(&json!("api.test")));
        assert_eq!(interpolation.get("config.limit"), Some(&json!(10)));
        assert_eq!(interpolation.get("config.auth.user"), Some(&json!("bob")));
    }

    #[test]
    fn test_overrides_reject_missing_equals() {
        assert!(overrides(Interpolation::new(), &["oops".to_string()]).is_err());
    }
}
