//! CLI argument definitions for marketlens.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `asset` | Current quote for one or more symbols |
//! | `history` | Price history over a look-back range |
//! | `fundamentals` | Company fundamentals |
//! | `news` | Market, crypto or company news |
//! | `search` | Instrument search |
//! | `series` | Macroeconomic series (FRED) |
//! | `filings` | Regulatory filings (SEC EDGAR) |
//! | `health` | Configured sources and their health |
//! | `classify` | Asset class of raw symbols, no network |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, ndjson, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat warnings as failures |
//! | `--no-fallback` | `false` | Only ask the primary source |
//! | `--timeout-ms` | env / `10000` | Per-request HTTP timeout |
//! | `--fixture` | unset | Serve from a fixture file instead of live APIs |
//!
//! # Examples
//!
//! ```bash
//! marketlens asset AAPL BTC eth-usd --pretty
//! marketlens history AAPL --range 3m
//! marketlens news --scope company --symbol TSLA --limit 5
//! marketlens series UNRATE --limit 12
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use marketlens_core::HistoryRange;

/// Multi-provider market data for stocks, funds and crypto.
#[derive(Debug, Parser)]
#[command(
    name = "marketlens",
    author,
    version,
    about = "Multi-provider market data CLI",
    long_about = "marketlens aggregates Alpha Vantage, Finnhub, Polygon, CoinGecko, FRED, \
SEC EDGAR, NewsAPI and StockTwits behind one interface. Each request walks an ordered \
list of sources and falls back when one fails.\n\
\n\
API keys are read from MARKETLENS_<PROVIDER>_API_KEY (or <PROVIDER>_API_KEY), \
optionally from a .env file. Logs go to stderr; set RUST_LOG to tune them."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings (missing data) as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Ask only the first candidate source for each request.
    #[arg(long, global = true, default_value_t = false)]
    pub no_fallback: bool,

    /// Per-request HTTP timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Serve every request from this fixture file.
    #[arg(long, global = true, value_name = "PATH")]
    pub fixture: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary for terminal display.
    Table,
    /// Single JSON object output.
    Json,
    /// Compact single-line JSON.
    Ndjson,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the current quote for one or more symbols.
    ///
    ///   marketlens asset AAPL
    ///   marketlens asset AAPL BTC SPY --pretty
    Asset(AssetArgs),

    /// Fetch price history.
    ///
    ///   marketlens history AAPL --range 1y
    ///   marketlens history BTC --range 1d
    History(HistoryArgs),

    /// Fetch company fundamentals.
    Fundamentals(SymbolArgs),

    /// Fetch news, deduplicated across sources.
    ///
    ///   marketlens news
    ///   marketlens news --scope crypto
    ///   marketlens news --scope company --symbol NVDA
    News(NewsArgs),

    /// Search instruments by symbol or name.
    Search(SearchArgs),

    /// Fetch a macroeconomic series by id (e.g. GDP, UNRATE, CPIAUCSL).
    Series(SeriesArgs),

    /// List recent regulatory filings for a company.
    Filings(FilingsArgs),

    /// Report health of every configured source.
    Health,

    /// Show the asset class each symbol resolves to. Never touches the network.
    Classify(ClassifyArgs),
}

#[derive(Debug, Args)]
pub struct AssetArgs {
    /// Symbols (AAPL, BTC, eth-usd, ^GSPC, ...).
    #[arg(required = true)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    pub symbol: String,

    /// Look-back range: 1d, 1w, 1m, 3m, 1y, 5y.
    #[arg(long, default_value = "1m")]
    pub range: HistoryRange,
}

#[derive(Debug, Args)]
pub struct SymbolArgs {
    pub symbol: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NewsScopeArg {
    Market,
    Crypto,
    Company,
}

#[derive(Debug, Args)]
pub struct NewsArgs {
    #[arg(long, value_enum, default_value_t = NewsScopeArg::Market)]
    pub scope: NewsScopeArg,

    /// Required with `--scope company`.
    #[arg(long, required_if_eq("scope", "company"))]
    pub symbol: Option<String>,

    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    pub query: String,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct SeriesArgs {
    pub series_id: String,

    /// Most recent observations to return.
    #[arg(long, default_value_t = 100)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct FilingsArgs {
    pub symbol: String,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    #[arg(required = true)]
    pub symbols: Vec<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn history_range_parses_through_core() {
        let cli = Cli::try_parse_from(["marketlens", "history", "aapl", "--range", "3m"])
            .expect("parses");
        match cli.command {
            Command::History(args) => assert_eq!(args.range, HistoryRange::ThreeMonths),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn bad_range_is_rejected() {
        assert!(Cli::try_parse_from(["marketlens", "history", "AAPL", "--range", "2w"]).is_err());
    }

    #[test]
    fn company_news_needs_a_symbol() {
        assert!(Cli::try_parse_from(["marketlens", "news", "--scope", "company"]).is_err());
        let cli = Cli::try_parse_from([
            "marketlens",
            "--pretty",
            "news",
            "--scope",
            "company",
            "--symbol",
            "TSLA",
        ])
        .expect("parses");
        assert!(cli.pretty);
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "marketlens",
            "asset",
            "BTC",
            "--no-fallback",
            "--timeout-ms",
            "2500",
        ])
        .expect("parses");
        assert!(cli.no_fallback);
        assert_eq!(cli.timeout_ms, Some(2500));
    }
}
