use marketlens_core::{EconomicSeries, UnifiedService};
use serde::Serialize;
use serde_json::Value;

use crate::cli::SeriesArgs;
use crate::error::CliError;

use super::{no_data, CommandResult};

#[derive(Debug, Serialize)]
struct SeriesResponseData {
    series: EconomicSeries,
}

pub async fn run(args: &SeriesArgs, service: &UnifiedService) -> Result<CommandResult, CliError> {
    let Some(series) = service
        .get_economic_series(&args.series_id, args.limit)
        .await
    else {
        return Ok(CommandResult::ok(Value::Null)
            .with_warning(no_data(format_args!("series {}", args.series_id))));
    };

    let source = series.source;
    let data = serde_json::to_value(SeriesResponseData { series })?;
    Ok(CommandResult::ok(data).with_sources([source]))
}
