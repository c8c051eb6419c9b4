use marketlens_core::{NewsItem, UnifiedService};
use serde::Serialize;

use crate::cli::{NewsArgs, NewsScopeArg};
use crate::error::CliError;

use super::{no_data, CommandResult};

#[derive(Debug, Serialize)]
struct NewsResponseData {
    scope: &'static str,
    items: Vec<NewsItem>,
}

pub async fn run(args: &NewsArgs, service: &UnifiedService) -> Result<CommandResult, CliError> {
    let (scope, items) = match (args.scope, args.symbol.as_deref()) {
        (NewsScopeArg::Market, _) => ("market", service.get_market_news(args.limit).await),
        (NewsScopeArg::Crypto, _) => ("crypto", service.get_crypto_news(args.limit).await),
        (NewsScopeArg::Company, Some(symbol)) => (
            "company",
            service.get_company_news(symbol, args.limit).await,
        ),
        (NewsScopeArg::Company, None) => {
            return Err(CliError::Command(String::from(
                "--scope company requires --symbol",
            )))
        }
    };

    let sources = items.iter().map(|item| item.provider).collect::<Vec<_>>();
    let empty = items.is_empty();
    let data = serde_json::to_value(NewsResponseData { scope, items })?;

    let result = CommandResult::ok(data).with_sources(sources);
    Ok(if empty {
        result.with_warning(no_data(format_args!("{scope} news")))
    } else {
        result
    })
}
