//! Binance spells symbols canonically; only streams need lowercase names.

use crate::adapter::outbound::shared::SymbolMap;
use crate::domain::Symbol;

#[must_use]
pub fn symbol_map() -> SymbolMap {
    SymbolMap::passthrough()
}

/// Stream name prefix, e.g. `btcusdt`.
#[must_use]
pub fn stream_symbol(symbols: &SymbolMap, symbol: &Symbol) -> String {
    symbols.to_venue(symbol).to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_symbols_round_trip() {
        let map = symbol_map();
        for raw in ["BTCUSDT", "ETHBTC", "BNBUSDT", "SOLUSDC"] {
            let symbol = Symbol::new(raw);
            assert_eq!(map.from_venue(&map.to_venue(&symbol)), symbol);
        }
    }

    #[test]
    fn stream_names_are_lowercase() {
        assert_eq!(stream_symbol(&symbol_map(), &Symbol::new("BTCUSDT")), "btcusdt");
    }
}
