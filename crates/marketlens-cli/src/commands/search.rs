use marketlens_core::{Instrument, UnifiedService};
use serde::Serialize;

use crate::cli::SearchArgs;
use crate::error::CliError;

use super::{no_data, CommandResult};

#[derive(Debug, Serialize)]
struct SearchResponseData {
    query: String,
    results: Vec<Instrument>,
}

pub async fn run(args: &SearchArgs, service: &UnifiedService) -> Result<CommandResult, CliError> {
    let query = args.query.trim();
    if query.is_empty() {
        return Err(CliError::Command(String::from("search query must not be empty")));
    }

    let results = service.search(query, args.limit).await;
    let sources = results
        .iter()
        .map(|instrument| instrument.source)
        .collect::<Vec<_>>();
    let empty = results.is_empty();
    let data = serde_json::to_value(SearchResponseData {
        query: query.to_owned(),
        results,
    })?;

    let result = CommandResult::ok(data).with_sources(sources);
    Ok(if empty {
        result.with_warning(no_data(format_args!("matches for '{query}'")))
    } else {
        result
    })
}
