//! Trading-pair symbol handling. Canonical form is `BASE/QUOTE`; the REST
//! surface uses the URL-safe `BASE-QUOTE` form and converts at the edge.

use crate::error::EngineError;

/// Split a canonical symbol into its base and quote assets.
pub fn split(symbol: &str) -> Result<(&str, &str), EngineError> {
    match symbol.split_once('/') {
        Some((base, quote))
            if !base.is_empty() && !quote.is_empty() && !quote.contains('/') && base != quote =>
        {
            Ok((base, quote))
        }
        _ => Err(EngineError::InvalidSymbol(symbol.to_string())),
    }
}

/// Base asset of a symbol (`BTC/USDT` -> `BTC`).
pub fn base(symbol: &str) -> Result<&str, EngineError> {
    split(symbol).map(|(base, _)| base)
}

/// Quote asset of a symbol (`BTC/USDT` -> `USDT`).
pub fn quote(symbol: &str) -> Result<&str, EngineError> {
    split(symbol).map(|(_, quote)| quote)
}

/// Wire form to canonical form (`BTC-USDT` -> `BTC/USDT`).
pub fn from_wire(symbol: &str) -> String {
    symbol.replace('-', "/")
}

/// Canonical form to wire form (`BTC/USDT` -> `BTC-USDT`).
pub fn to_wire(symbol: &str) -> String {
    symbol.replace('/', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_valid_symbol() {
        assert_eq!(split("BTC/USDT").unwrap(), ("BTC", "USDT"));
        assert_eq!(base("ETH/USDT").unwrap(), "ETH");
        assert_eq!(quote("ETH/USDT").unwrap(), "USDT");
    }

    #[test]
    fn rejects_malformed_symbols() {
        for bad in ["", "BTC", "BTC/", "/USDT", "BTC/USDT/X", "BTC/BTC"] {
            assert!(split(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn wire_round_trip() {
        assert_eq!(from_wire("BTC-USDT"), "BTC/USDT");
        assert_eq!(to_wire("BTC/USDT"), "BTC-USDT");
        assert_eq!(from_wire(&to_wire("SOL/USDC")), "SOL/USDC");
    }
}
