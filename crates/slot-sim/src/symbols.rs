//! Symbol table and reel strips for the synthetic machine

use serde::{Deserialize, Serialize};

use slot_core::{Credits, Symbol};

/// A symbol definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolDef {
    /// Display name sent in outcomes ("7", "BAR", ...)
    pub name: String,
    /// Relative frequency on each strip
    pub weight: u32,
    /// Payout for three of a kind, as a multiple of the bet
    pub pays: Credits,
    /// Three of these on the payline win the progressive pool
    pub jackpot: bool,
}

impl SymbolDef {
    pub fn regular(name: impl Into<String>, weight: u32, pays: Credits) -> Self {
        Self {
            name: name.into(),
            weight,
            pays,
            jackpot: false,
        }
    }

    pub fn jackpot(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
            pays: 0,
            jackpot: true,
        }
    }
}

/// Symbols of a classic three-reel machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolTable {
    pub symbols: Vec<SymbolDef>,
    /// Payout for two or more of the lowest paying symbol anywhere on the
    /// line, as a bet multiple
    pub pair_pays: Credits,
}

impl SymbolTable {
    /// Standard table, lowest paying first
    pub fn classic() -> Self {
        Self {
            symbols: vec![
                SymbolDef::regular("CHERRY", 30, 5),
                SymbolDef::regular("LEMON", 26, 8),
                SymbolDef::regular("ORANGE", 20, 12),
                SymbolDef::regular("BELL", 12, 20),
                SymbolDef::regular("BAR", 7, 40),
                SymbolDef::regular("7", 4, 100),
                SymbolDef::jackpot("DIAMOND", 1),
            ],
            pair_pays: 1,
        }
    }

    pub fn get(&self, index: usize) -> Option<&SymbolDef> {
        self.symbols.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s.name == name)
    }

    /// Index of the jackpot symbol
    pub fn jackpot_index(&self) -> Option<usize> {
        self.symbols.iter().position(|s| s.jackpot)
    }

    /// Highest paying regular symbol
    pub fn top_index(&self) -> Option<usize> {
        self.symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.jackpot)
            .max_by_key(|(_, s)| s.pays)
            .map(|(i, _)| i)
    }

    /// Lowest paying regular symbol
    pub fn bottom_index(&self) -> Option<usize> {
        self.symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.jackpot)
            .min_by_key(|(_, s)| s.pays)
            .map(|(i, _)| i)
    }

    pub fn to_symbol(&self, index: usize) -> Symbol {
        self.symbols
            .get(index)
            .map(|s| Symbol::new(s.name.clone()))
            .unwrap_or_else(|| Symbol::new("?"))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::classic()
    }
}

/// A virtual reel strip of symbol indices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReelStrip {
    pub symbols: Vec<usize>,
}

impl ReelStrip {
    pub fn new(symbols: Vec<usize>) -> Self {
        Self { symbols }
    }

    /// Symbol at `position`, wrapping around
    pub fn symbol_at(&self, position: usize) -> usize {
        if self.symbols.is_empty() {
            return 0;
        }
        self.symbols[position % self.symbols.len()]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Build `reel_count` strips where each symbol appears in proportion to its
/// weight. Strips are interleaved so equal symbols do not cluster.
pub fn generate_weighted_strips(table: &SymbolTable, reel_count: usize) -> Vec<ReelStrip> {
    let total: u32 = table.symbols.iter().map(|s| s.weight).sum();
    let mut base = Vec::with_capacity(total as usize);
    let mut left: Vec<u32> = table.symbols.iter().map(|s| s.weight).collect();

    // Round-robin over symbols until all weights are spent
    while left.iter().any(|&w| w > 0) {
        for (index, weight) in left.iter_mut().enumerate() {
            if *weight > 0 {
                base.push(index);
                *weight -= 1;
            }
        }
    }

    (0..reel_count)
        .map(|reel| {
            // Offset each reel so the strips differ
            let mut symbols = base.clone();
            if !symbols.is_empty() {
                let shift = (reel * 7) % symbols.len();
                symbols.rotate_left(shift);
            }
            ReelStrip::new(symbols)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_table() {
        let table = SymbolTable::classic();
        assert_eq!(table.jackpot_index(), table.index_of("DIAMOND"));
        assert_eq!(table.top_index(), table.index_of("7"));
        assert_eq!(table.bottom_index(), table.index_of("CHERRY"));
    }

    #[test]
    fn test_strips_follow_weights() {
        let table = SymbolTable::classic();
        let strips = generate_weighted_strips(&table, 3);
        assert_eq!(strips.len(), 3);

        let cherry = table.index_of("CHERRY").unwrap();
        let diamond = table.index_of("DIAMOND").unwrap();
        for strip in &strips {
            assert_eq!(strip.len(), 100);
            assert_eq!(strip.symbols.iter().filter(|&&s| s == cherry).count(), 30);
            assert_eq!(strip.symbols.iter().filter(|&&s| s == diamond).count(), 1);
        }
        assert_ne!(strips[0].symbols, strips[1].symbols);
    }

    #[test]
    fn test_reel_strip_wrap() {
        let strip = ReelStrip::new(vec![1, 2, 3]);
        assert_eq!(strip.symbol_at(0), 1);
        assert_eq!(strip.symbol_at(3), 1);
        assert_eq!(strip.symbol_at(5), 3);
    }
}
