use marketlens_core::{PriceHistory, UnifiedService};
use serde::Serialize;
use serde_json::Value;

use crate::cli::HistoryArgs;
use crate::error::CliError;

use super::{no_data, CommandResult};

#[derive(Debug, Serialize)]
struct HistoryResponseData {
    history: PriceHistory,
}

pub async fn run(args: &HistoryArgs, service: &UnifiedService) -> Result<CommandResult, CliError> {
    let Some(history) = service.get_price_history(&args.symbol, args.range).await else {
        return Ok(CommandResult::ok(Value::Null).with_warning(no_data(format_args!(
            "{} history for {}",
            args.range, args.symbol
        ))));
    };

    let source = history.source;
    let data = serde_json::to_value(HistoryResponseData { history })?;
    Ok(CommandResult::ok(data).with_sources([source]))
}
