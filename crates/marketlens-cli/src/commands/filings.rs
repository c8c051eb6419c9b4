use marketlens_core::{Filing, UnifiedService};
use serde::Serialize;

use crate::cli::FilingsArgs;
use crate::error::CliError;

use super::{no_data, CommandResult};

#[derive(Debug, Serialize)]
struct FilingsResponseData {
    filings: Vec<Filing>,
}

pub async fn run(args: &FilingsArgs, service: &UnifiedService) -> Result<CommandResult, CliError> {
    let filings = service.get_filings(&args.symbol, args.limit).await;
    let empty = filings.is_empty();
    let data = serde_json::to_value(FilingsResponseData { filings })?;

    let result = CommandResult::ok(data);
    Ok(if empty {
        result.with_warning(no_data(format_args!("filings for {}", args.symbol)))
    } else {
        result
    })
}
