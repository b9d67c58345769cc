//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{ExecutionProvider, PreloadPolicy, StudioConfig, StudioConfigBuilder},
    models::ModelId,
};
use anyhow::{Context, Result};

/// Convert CLI arguments to a [`StudioConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Layer CLI arguments over the config file (or the defaults)
    pub(crate) fn from_cli(cli: &Cli) -> Result<StudioConfig> {
        let base = match &cli.config {
            Some(path) => StudioConfig::from_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => StudioConfig::load_or_default(),
        };
        Self::apply(cli, StudioConfigBuilder::from_config(base))
    }

    fn apply(cli: &Cli, mut builder: StudioConfigBuilder) -> Result<StudioConfig> {
        if let Some(model) = &cli.model {
            let model: ModelId = model
                .parse()
                .with_context(|| format!("Unknown model '{model}'"))?;
            builder = builder.default_model(model);
        }

        if let Some(dir) = &cli.model_dir {
            builder = builder.model_dir(dir.clone());
        }

        if !cli.execution_provider.is_empty() {
            let providers = cli
                .execution_provider
                .iter()
                .map(|p| p.parse::<ExecutionProvider>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Invalid execution provider")?;
            builder = builder.execution_providers(providers);
        }

        if let Some(threads) = cli.threads {
            builder = builder.intra_threads(threads);
        }

        if cli.alpha_matting {
            builder = builder.edge_refinement(true);
        }

        if cli.report_preload_failures {
            builder = builder.preload_policy(PreloadPolicy::Report);
        }

        builder.build().context("Invalid configuration")
    }
}
