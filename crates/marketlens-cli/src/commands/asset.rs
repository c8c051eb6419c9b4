use marketlens_core::{Asset, UnifiedService};
use serde::Serialize;

use crate::cli::AssetArgs;
use crate::error::CliError;

use super::{no_data, CommandResult};

#[derive(Debug, Serialize)]
struct AssetResponseData {
    assets: Vec<Asset>,
}

pub async fn run(args: &AssetArgs, service: &UnifiedService) -> Result<CommandResult, CliError> {
    let assets = match args.symbols.as_slice() {
        [single] => service.get_asset(single).await.into_iter().collect(),
        symbols => {
            let symbols = symbols.iter().map(String::as_str).collect::<Vec<_>>();
            service.get_assets(&symbols).await
        }
    };

    let warnings = args
        .symbols
        .iter()
        .filter(|raw| {
            let wanted = service.classify(raw).symbol;
            !assets.iter().any(|asset| asset.symbol == wanted)
        })
        .map(|raw| no_data(format_args!("a quote for {raw}")))
        .collect::<Vec<_>>();

    let sources = assets.iter().map(|asset| asset.source).collect::<Vec<_>>();
    let data = serde_json::to_value(AssetResponseData { assets })?;

    Ok(CommandResult::ok(data)
        .with_sources(sources)
        .with_warnings(warnings))
}
