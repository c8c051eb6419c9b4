use marketlens_core::{classify, Classification};
use serde::Serialize;

use crate::cli::ClassifyArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct ClassifyResponseData {
    classifications: Vec<ClassifiedSymbol>,
}

#[derive(Debug, Serialize)]
struct ClassifiedSymbol {
    input: String,
    #[serde(flatten)]
    classification: Classification,
}

pub fn run(args: &ClassifyArgs) -> Result<CommandResult, CliError> {
    let classifications = args
        .symbols
        .iter()
        .map(|raw| ClassifiedSymbol {
            input: raw.clone(),
            classification: classify(raw),
        })
        .collect::<Vec<_>>();

    let warnings = classifications
        .iter()
        .filter(|entry| entry.classification.symbol.is_empty())
        .map(|entry| format!("'{}' is not a usable symbol", entry.input))
        .collect::<Vec<_>>();

    let data = serde_json::to_value(ClassifyResponseData { classifications })?;
    Ok(CommandResult::ok(data).with_warnings(warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_without_a_service() {
        let args = ClassifyArgs {
            symbols: vec![String::from("btc-usd"), String::from("aapl"), String::from("  ")],
        };
        let result = run(&args).expect("classify");

        let entries = result.data["classifications"].as_array().expect("array");
        assert_eq!(entries[0]["symbol"], "BTC");
        assert_eq!(entries[0]["asset_class"], "crypto");
        assert_eq!(entries[1]["asset_class"], "stock");
        assert_eq!(result.warnings.len(), 1);
    }
}
