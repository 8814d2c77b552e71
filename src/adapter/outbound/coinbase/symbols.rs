//! Coinbase spells products `BASE-QUOTE`.

use crate::adapter::outbound::shared::{Fallback, SymbolMap};

const PAIRS: [(&str, &str); 10] = [
    ("BTCUSDT", "BTC-USDT"),
    ("ETHUSDT", "ETH-USDT"),
    ("LTCUSDT", "LTC-USDT"),
    ("BCHUSDT", "BCH-USDT"),
    ("ADAUSDT", "ADA-USDT"),
    ("DOTUSDT", "DOT-USDT"),
    ("LINKUSDT", "LINK-USDT"),
    ("XLMUSDT", "XLM-USDT"),
    ("UNIUSDT", "UNI-USDT"),
    ("AAVEUSDT", "AAVE-USDT"),
];

#[must_use]
pub fn symbol_map() -> SymbolMap {
    SymbolMap::new(&PAIRS, Fallback::Separated('-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Symbol;

    #[test]
    fn known_pairs_round_trip() {
        let map = symbol_map();
        for (canonical, native) in PAIRS {
            let symbol = Symbol::new(canonical);
            assert_eq!(map.to_venue(&symbol), native);
            assert_eq!(map.from_venue(native), symbol);
        }
    }

    #[test]
    fn unknown_pairs_are_split_on_recognised_quote() {
        let map = symbol_map();
        assert_eq!(map.to_venue(&Symbol::new("SOLUSDC")), "SOL-USDC");
        assert_eq!(map.from_venue("SOL-USD").as_str(), "SOLUSD");
    }
}
