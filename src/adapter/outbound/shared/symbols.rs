//! Bidirectional canonical/native symbol and asset maps.

use std::collections::HashMap;

use crate::domain::Symbol;

/// How unknown symbols are spelled natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Uppercase canonical form, unchanged.
    Passthrough,
    /// `BASE{sep}QUOTE` when the quote can be recognised, else passthrough.
    Separated(char),
}

#[derive(Debug, Clone)]
pub struct SymbolMap {
    to_native: HashMap<Symbol, String>,
    from_native: HashMap<String, Symbol>,
    fallback: Fallback,
}

impl SymbolMap {
    /// Build a map from `(canonical, native)` pairs.
    #[must_use]
    pub fn new(pairs: &[(&str, &str)], fallback: Fallback) -> Self {
        let mut to_native = HashMap::with_capacity(pairs.len());
        let mut from_native = HashMap::with_capacity(pairs.len());
        for (canonical, native) in pairs {
            let symbol = Symbol::new(canonical);
            to_native.insert(symbol.clone(), native.to_string());
            from_native.insert(native.to_ascii_uppercase(), symbol);
        }
        Self {
            to_native,
            from_native,
            fallback,
        }
    }

    #[must_use]
    pub fn passthrough() -> Self {
        Self::new(&[], Fallback::Passthrough)
    }

    /// Canonical to venue spelling.
    #[must_use]
    pub fn to_venue(&self, symbol: &Symbol) -> String {
        if let Some(native) = self.to_native.get(symbol) {
            return native.clone();
        }
        match self.fallback {
            Fallback::Passthrough => symbol.as_str().to_string(),
            Fallback::Separated(sep) => match symbol.split() {
                Some((base, quote)) => format!("{base}{sep}{quote}"),
                None => symbol.as_str().to_string(),
            },
        }
    }

    /// Venue spelling to canonical.
    #[must_use]
    pub fn from_venue(&self, native: &str) -> Symbol {
        let key = native.trim().to_ascii_uppercase();
        if let Some(symbol) = self.from_native.get(&key) {
            return symbol.clone();
        }
        match self.fallback {
            Fallback::Passthrough => Symbol::new(key),
            Fallback::Separated(sep) => Symbol::new(key.replace(sep, "")),
        }
    }

    /// Canonical symbols with an explicit mapping.
    pub fn known(&self) -> impl Iterator<Item = &Symbol> {
        self.to_native.keys()
    }
}

/// Venue asset codes that differ from the canonical spelling.
#[derive(Debug, Clone, Default)]
pub struct AssetMap {
    from_native: HashMap<String, String>,
    to_native: HashMap<String, String>,
}

impl AssetMap {
    /// Build from `(native, canonical)` pairs. When several native codes
    /// map to one canonical asset, the first pair is used in the reverse
    /// direction.
    #[must_use]
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut map = Self::default();
        for (native, canonical) in pairs {
            map.from_native
                .insert(native.to_ascii_uppercase(), canonical.to_ascii_uppercase());
            map.to_native
                .entry(canonical.to_ascii_uppercase())
                .or_insert_with(|| native.to_ascii_uppercase());
        }
        map
    }

    #[must_use]
    pub fn normalize(&self, native: &str) -> String {
        let key = native.trim().to_ascii_uppercase();
        self.from_native.get(&key).cloned().unwrap_or(key)
    }

    #[must_use]
    pub fn to_venue(&self, canonical: &str) -> String {
        let key = canonical.trim().to_ascii_uppercase();
        self.to_native.get(&key).cloned().unwrap_or(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_pairs_round_trip() {
        let map = SymbolMap::new(&[("BTCUSDT", "XBTUSD")], Fallback::Passthrough);
        let symbol = Symbol::new("BTCUSDT");
        assert_eq!(map.to_venue(&symbol), "XBTUSD");
        assert_eq!(map.from_venue("xbtusd"), symbol);
    }

    #[test]
    fn passthrough_for_unknown_symbols() {
        let map = SymbolMap::passthrough();
        assert_eq!(map.to_venue(&Symbol::new("solusdt")), "SOLUSDT");
        assert_eq!(map.from_venue("solusdt"), Symbol::new("SOLUSDT"));
    }

    #[test]
    fn separated_fallback_splits_on_quote() {
        let map = SymbolMap::new(&[], Fallback::Separated('-'));
        assert_eq!(map.to_venue(&Symbol::new("SOLUSDC")), "SOL-USDC");
        assert_eq!(map.to_venue(&Symbol::new("WEIRD")), "WEIRD");
        assert_eq!(map.from_venue("SOL-USDC"), Symbol::new("SOLUSDC"));
    }

    #[test]
    fn asset_map_normalizes_both_ways() {
        let assets = AssetMap::new(&[("XXBT", "BTC"), ("XBT", "BTC"), ("ZUSD", "USD")]);
        assert_eq!(assets.normalize("XXBT"), "BTC");
        assert_eq!(assets.normalize("XBT"), "BTC");
        assert_eq!(assets.normalize("dot"), "DOT");
        assert_eq!(assets.to_venue("BTC"), "XXBT");
    }
}
