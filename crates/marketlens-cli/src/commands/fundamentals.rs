use marketlens_core::{Fundamentals, UnifiedService};
use serde::Serialize;
use serde_json::Value;

use crate::cli::SymbolArgs;
use crate::error::CliError;

use super::{no_data, CommandResult};

#[derive(Debug, Serialize)]
struct FundamentalsResponseData {
    fundamentals: Fundamentals,
}

pub async fn run(args: &SymbolArgs, service: &UnifiedService) -> Result<CommandResult, CliError> {
    let Some(fundamentals) = service.get_fundamentals(&args.symbol).await else {
        return Ok(CommandResult::ok(Value::Null)
            .with_warning(no_data(format_args!("fundamentals for {}", args.symbol))));
    };

    let source = fundamentals.source;
    let data = serde_json::to_value(FundamentalsResponseData { fundamentals })?;
    Ok(CommandResult::ok(data).with_sources(source))
}
