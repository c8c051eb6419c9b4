mod asset;
mod classify;
mod filings;
mod fundamentals;
mod health;
mod history;
mod news;
mod search;
mod series;

use std::time::Instant;

use marketlens_core::{DataMode, ProviderId, ServiceConfig, UnifiedService};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::{Envelope, Metadata};

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub sources: Vec<ProviderId>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            sources: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// Record contributing providers, keeping first-seen order.
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = ProviderId>) -> Self {
        for source in sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
        self
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope, CliError> {
    let started = Instant::now();

    let command_result = match &cli.command {
        Command::Classify(args) => classify::run(args)?,
        Command::Asset(args) => asset::run(args, &build_service(cli)?).await?,
        Command::History(args) => history::run(args, &build_service(cli)?).await?,
        Command::Fundamentals(args) => fundamentals::run(args, &build_service(cli)?).await?,
        Command::News(args) => news::run(args, &build_service(cli)?).await?,
        Command::Search(args) => search::run(args, &build_service(cli)?).await?,
        Command::Series(args) => series::run(args, &build_service(cli)?).await?,
        Command::Filings(args) => filings::run(args, &build_service(cli)?).await?,
        Command::Health => health::run(&build_service(cli)?)?,
    };

    let CommandResult {
        data,
        warnings,
        sources,
    } = command_result;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut meta = Metadata::new(sources, latency_ms);
    for warning in warnings {
        meta.push_warning(warning);
    }

    Ok(Envelope { meta, data })
}

fn build_service(cli: &Cli) -> Result<UnifiedService, CliError> {
    let service = UnifiedService::from_config(service_config(cli)?)?;
    debug!(sources = ?service.source_ids(), "service built");
    Ok(service)
}

/// Environment configuration with command-line overrides applied.
fn service_config(cli: &Cli) -> Result<ServiceConfig, CliError> {
    let mut config = ServiceConfig::from_env()?;

    if let Some(path) = &cli.fixture {
        config = config.with_mode(DataMode::Fixture).with_fixture_path(path);
    }
    if cli.no_fallback {
        config = config.with_fallback(false);
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        if timeout_ms == 0 {
            return Err(CliError::Command(String::from(
                "--timeout-ms must be greater than zero",
            )));
        }
        config.http_timeout_ms = timeout_ms;
    }

    Ok(config)
}

/// Warning text for an operation that no source could answer.
fn no_data(what: impl std::fmt::Display) -> String {
    format!("no source returned {what}")
}
