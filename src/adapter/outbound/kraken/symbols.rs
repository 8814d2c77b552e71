//! Kraken pair and asset names.
//!
//! Kraken spells bitcoin `XBT`, quotes its majors in USD and prefixes legacy
//! asset codes with `X`/`Z`. REST uses altnames (`XBTUSD`), responses may
//! key results by the legacy pair name (`XXBTZUSD`), and the WebSocket API
//! uses slash names (`XBT/USD`).

use crate::adapter::outbound::shared::{AssetMap, Fallback, SymbolMap};

/// `(canonical, altname, legacy name, websocket name)`.
const PAIRS: [(&str, &str, Option<&str>, &str); 10] = [
    ("BTCUSDT", "XBTUSD", Some("XXBTZUSD"), "XBT/USD"),
    ("ETHUSDT", "ETHUSD", Some("XETHZUSD"), "ETH/USD"),
    ("LTCUSDT", "LTCUSD", Some("XLTCZUSD"), "LTC/USD"),
    ("BCHUSDT", "BCHUSD", None, "BCH/USD"),
    ("ADAUSDT", "ADAUSD", None, "ADA/USD"),
    ("DOTUSDT", "DOTUSD", None, "DOT/USD"),
    ("LINKUSDT", "LINKUSD", None, "LINK/USD"),
    ("XLMUSDT", "XLMUSD", Some("XXLMZUSD"), "XLM/USD"),
    ("UNIUSDT", "UNIUSD", None, "UNI/USD"),
    ("AAVEUSDT", "AAVEUSD", None, "AAVE/USD"),
];

/// `(native, canonical)`; the first code per asset is used when sending.
const ASSETS: [(&str, &str); 7] = [
    ("XXBT", "BTC"),
    ("XBT", "BTC"),
    ("XETH", "ETH"),
    ("XLTC", "LTC"),
    ("XXLM", "XLM"),
    ("ZUSD", "USDT"),
    ("USD", "USDT"),
];

/// REST altnames. Legacy names resolve too but are never sent.
#[must_use]
pub fn rest_map() -> SymbolMap {
    let mut pairs = Vec::with_capacity(PAIRS.len() * 2);
    for (canonical, altname, legacy, _) in PAIRS {
        // Later entries win the canonical-to-native direction.
        if let Some(legacy) = legacy {
            pairs.push((canonical, legacy));
        }
        pairs.push((canonical, altname));
    }
    SymbolMap::new(&pairs, Fallback::Passthrough)
}

#[must_use]
pub fn ws_map() -> SymbolMap {
    let pairs: Vec<_> = PAIRS.iter().map(|(c, _, _, ws)| (*c, *ws)).collect();
    SymbolMap::new(&pairs, Fallback::Separated('/'))
}

#[must_use]
pub fn asset_map() -> AssetMap {
    AssetMap::new(&ASSETS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Symbol;

    #[test]
    fn rest_names_round_trip() {
        let map = rest_map();
        for (canonical, altname, legacy, _) in PAIRS {
            let symbol = Symbol::new(canonical);
            assert_eq!(map.to_venue(&symbol), altname);
            assert_eq!(map.from_venue(altname), symbol);
            if let Some(legacy) = legacy {
                assert_eq!(map.from_venue(legacy), symbol);
            }
        }
    }

    #[test]
    fn websocket_names_round_trip() {
        let map = ws_map();
        let symbol = Symbol::new("BTCUSDT");
        assert_eq!(map.to_venue(&symbol), "XBT/USD");
        assert_eq!(map.from_venue("XBT/USD"), symbol);
        assert_eq!(map.to_venue(&Symbol::new("SOLEUR")), "SOL/EUR");
        assert_eq!(map.from_venue("SOL/EUR").as_str(), "SOLEUR");
    }

    #[test]
    fn legacy_assets_normalize() {
        let assets = asset_map();
        assert_eq!(assets.normalize("XXBT"), "BTC");
        assert_eq!(assets.normalize("ZUSD"), "USDT");
        assert_eq!(assets.normalize("DOT"), "DOT");
        assert_eq!(assets.to_venue("BTC"), "XXBT");
    }
}
