//! Symbol classification.
//!
//! Maps a raw ticker to its canonical symbol and asset class. Pure and total:
//! every input yields a classification.

use serde::Serialize;

use crate::{AssetClass, Symbol};

/// Crypto asset known to the classifier, with its CoinGecko coin id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoListing {
    pub symbol: &'static str,
    pub coin_id: &'static str,
    pub name: &'static str,
}

const fn listing(symbol: &'static str, coin_id: &'static str, name: &'static str) -> CryptoListing {
    CryptoListing {
        symbol,
        coin_id,
        name,
    }
}

/// Canonical crypto allow-list.
pub const CRYPTO_LISTINGS: &[CryptoListing] = &[
    listing("BTC", "bitcoin", "Bitcoin"),
    listing("ETH", "ethereum", "Ethereum"),
    listing("USDT", "tether", "Tether"),
    listing("BNB", "binancecoin", "BNB"),
    listing("SOL", "solana", "Solana"),
    listing("XRP", "ripple", "XRP"),
    listing("USDC", "usd-coin", "USDC"),
    listing("ADA", "cardano", "Cardano"),
    listing("DOGE", "dogecoin", "Dogecoin"),
    listing("TRX", "tron", "TRON"),
    listing("AVAX", "avalanche-2", "Avalanche"),
    listing("DOT", "polkadot", "Polkadot"),
    listing("LINK", "chainlink", "Chainlink"),
    listing("MATIC", "matic-network", "Polygon"),
    listing("SHIB", "shiba-inu", "Shiba Inu"),
    listing("LTC", "litecoin", "Litecoin"),
    listing("BCH", "bitcoin-cash", "Bitcoin Cash"),
    listing("UNI", "uniswap", "Uniswap"),
    listing("ATOM", "cosmos", "Cosmos Hub"),
    listing("XLM", "stellar", "Stellar"),
    listing("NEAR", "near", "NEAR Protocol"),
    listing("APT", "aptos", "Aptos"),
    listing("ARB", "arbitrum", "Arbitrum"),
    listing("OP", "optimism", "Optimism"),
    listing("FIL", "filecoin", "Filecoin"),
    listing("ICP", "internet-computer", "Internet Computer"),
    listing("ETC", "ethereum-classic", "Ethereum Classic"),
    listing("XMR", "monero", "Monero"),
    listing("AAVE", "aave", "Aave"),
    listing("PEPE", "pepe", "Pepe"),
];

/// Quote-currency suffixes stripped from pair notation (`BTC-USD`, `ETHUSDT`).
const PAIR_SUFFIXES: &[&str] = &["-USDT", "-USD", "/USDT", "/USD", "USDT", "USD"];

const INDEX_PREFIX: char = '^';
const MUTUAL_FUND_LEN: usize = 5;
const MUTUAL_FUND_SUFFIX: char = 'X';

/// Result of classifying a raw symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Classification {
    pub symbol: Symbol,
    pub asset_class: AssetClass,
}

/// Classify a raw ticker. Rules apply in order: canonicalize, crypto
/// allow-list (including pair notation), fund prefix/suffix, otherwise stock.
pub fn classify(raw: &str) -> Classification {
    let canonical = Symbol::canonical(raw);

    if let Some(listing) = crypto_listing(canonical.as_str()) {
        return Classification {
            symbol: Symbol::canonical(listing.symbol),
            asset_class: AssetClass::Crypto,
        };
    }

    if let Some(base) = strip_pair_suffix(canonical.as_str()) {
        return Classification {
            symbol: Symbol::canonical(base.symbol),
            asset_class: AssetClass::Crypto,
        };
    }

    if is_fund_symbol(canonical.as_str()) {
        return Classification {
            symbol: canonical,
            asset_class: AssetClass::Fund,
        };
    }

    Classification {
        symbol: canonical,
        asset_class: AssetClass::Stock,
    }
}

/// Look up an allow-listed crypto by canonical symbol.
pub fn crypto_listing(symbol: &str) -> Option<&'static CryptoListing> {
    CRYPTO_LISTINGS
        .iter()
        .find(|listing| listing.symbol == symbol)
}

/// Look up an allow-listed crypto by CoinGecko coin id.
pub fn crypto_listing_by_coin_id(coin_id: &str) -> Option<&'static CryptoListing> {
    CRYPTO_LISTINGS
        .iter()
        .find(|listing| listing.coin_id.eq_ignore_ascii_case(coin_id))
}

fn strip_pair_suffix(symbol: &str) -> Option<&'static CryptoListing> {
    PAIR_SUFFIXES.iter().find_map(|suffix| {
        let base = symbol.strip_suffix(suffix)?;
        crypto_listing(base)
    })
}

fn is_fund_symbol(symbol: &str) -> bool {
    if symbol.starts_with(INDEX_PREFIX) && symbol.len() > 1 {
        return true;
    }

    symbol.len() == MUTUAL_FUND_LEN
        && symbol.ends_with(MUTUAL_FUND_SUFFIX)
        && symbol.chars().all(|ch| ch.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_allow_listed_symbol_is_crypto() {
        for listing in CRYPTO_LISTINGS {
            let classified = classify(&listing.symbol.to_ascii_lowercase());
            assert_eq!(classified.asset_class, AssetClass::Crypto, "{}", listing.symbol);
            assert_eq!(classified.symbol.as_str(), listing.symbol);
        }
    }

    #[test]
    fn pair_notation_resolves_to_base_crypto() {
        assert_eq!(classify("btc-usd").symbol.as_str(), "BTC");
        assert_eq!(classify("ETHUSDT").symbol.as_str(), "ETH");
        assert_eq!(classify("sol/usd").asset_class, AssetClass::Crypto);
    }

    #[test]
    fn index_prefix_and_mutual_fund_suffix_are_funds() {
        assert_eq!(classify("^gspc").asset_class, AssetClass::Fund);
        assert_eq!(classify("VFIAX").asset_class, AssetClass::Fund);
        assert_eq!(classify("fxaix").symbol.as_str(), "FXAIX");
    }

    #[test]
    fn everything_else_defaults_to_stock() {
        for raw in ["AAPL", " msft ", "BRK.B", "XOM", "ABCDEX", "^", "", "USD", "ZZZUSD"] {
            assert_eq!(classify(raw).asset_class, AssetClass::Stock, "{raw:?}");
        }
    }

    #[test]
    fn classification_is_deterministic() {
        assert_eq!(classify("Doge"), classify("DOGE"));
    }

    #[test]
    fn coin_id_lookup_round_trips() {
        let listing = crypto_listing_by_coin_id("Avalanche-2").expect("listed");
        assert_eq!(listing.symbol, "AVAX");
    }
}
