use marketlens_core::{SourceHealth, UnifiedService};
use serde::Serialize;

use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct HealthResponseData {
    sources: Vec<SourceHealth>,
}

/// Health of a freshly built service: lists which sources are configured.
pub fn run(service: &UnifiedService) -> Result<CommandResult, CliError> {
    let sources = service.health();
    let ids = sources.iter().map(|health| health.source).collect::<Vec<_>>();
    let data = serde_json::to_value(HealthResponseData { sources })?;
    Ok(CommandResult::ok(data).with_sources(ids))
}
