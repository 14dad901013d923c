//! palisade-daemon entry point.
//!
//! Loads configuration, initializes logging, and runs the SIEM
//! pipeline until a shutdown signal arrives.

mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;

use palisade_core::config::PalisadeConfig;
use palisade_core::error::{ConfigError, PalisadeError};
use palisade_core::pipeline::Pipeline;
use palisade_pipeline::{RuleEngine, SiemPipelineBuilder};

use crate::cli::DaemonCli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = DaemonCli::parse();

    // Load configuration. A missing file at the default path is not an
    // error; the daemon runs on defaults plus environment overrides.
    let mut config = match PalisadeConfig::load(&args.config).await {
        Ok(config) => config,
        Err(PalisadeError::Config(ConfigError::FileNotFound { path })) => {
            eprintln!("config file not found at {path}, using defaults");
            let mut config = PalisadeConfig::default();
            config.apply_env_overrides();
            config
        }
        Err(e) => return Err(e).context("failed to load configuration"),
    };

    // CLI arguments take precedence over file and environment.
    if let Some(level) = args.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = args.log_format {
        config.general.log_format = format;
    }
    config.validate().context("invalid configuration")?;

    if args.validate {
        return validate_and_exit(&config).await;
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(config = %args.config.display(), "palisade-daemon starting");

    let mut pipeline = SiemPipelineBuilder::new()
        .config(config)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build siem pipeline: {}", e))?;

    pipeline
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start siem pipeline: {}", e))?;
    tracing::info!(rules = pipeline.rule_count(), "palisade-daemon running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    if let Err(e) = pipeline.stop().await {
        tracing::error!(error = %e, "failed to stop siem pipeline");
    }

    tracing::info!("palisade-daemon shut down");
    Ok(())
}

/// Check the configuration and rule files without starting the pipeline.
async fn validate_and_exit(config: &PalisadeConfig) -> Result<()> {
    println!("configuration: ok");
    println!("  collector.bind_addr = {}", config.collector.bind_addr);
    println!("  indexer.db_path     = {}", config.indexer.db_path);
    println!("  indexer.batch_size  = {}", config.indexer.batch_size);
    println!("  rules.rules_dir     = {}", config.rules.rules_dir);

    let mut engine = RuleEngine::new();
    match engine.load_from_dir(&config.rules.rules_dir).await {
        Ok(count) => println!("rules: {count} loaded"),
        Err(e) => {
            println!("rules: failed to load ({e})");
            anyhow::bail!("rule validation failed");
        }
    }

    Ok(())
}
