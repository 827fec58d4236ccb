//! Contract storage layouts
//!
//! Field indices are reverse-engineered per contract version, not published
//! in any schema, so they are data: each `ContractLayout` names its dictionary
//! roots (preference order) and, per logical field, the slots to try. Layouts
//! can be replaced from a JSON file without touching code.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::keys::FieldSlot;

/// Logical field names used by the resolver
pub mod field {
    pub const NAME: &str = "name";
    pub const SYMBOL: &str = "symbol";
    pub const DECIMALS: &str = "decimals";
    pub const TOTAL_SUPPLY: &str = "total_supply";
    pub const BALANCES: &str = "balances";
    pub const ALLOWANCES: &str = "allowances";
    pub const TOKEN0: &str = "token0";
    pub const TOKEN1: &str = "token1";
    pub const RESERVE0: &str = "reserve0";
    pub const RESERVE1: &str = "reserve1";
    pub const PAIRS: &str = "pairs";
}

pub const TOKEN_LAYOUT: &str = "token";
pub const PAIR_LAYOUT: &str = "pair";
pub const FACTORY_LAYOUT: &str = "factory";

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("failed to read layouts: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse layouts: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_roots() -> Vec<String> {
    vec!["state".to_string(), "__state".to_string(), "storage".to_string()]
}

/// Field index table for one contract layout version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractLayout {
    pub name: String,
    #[serde(default)]
    pub version: u32,
    /// Named keys that may hold the storage dictionary, first hit wins
    #[serde(default = "default_roots")]
    pub dictionary_roots: Vec<String>,
    pub fields: BTreeMap<String, Vec<FieldSlot>>,
}

impl ContractLayout {
    /// Fungible token contracts
    pub fn token() -> Self {
        Self::with_fields(
            TOKEN_LAYOUT,
            [
                (field::NAME, vec![FieldSlot::be(1)]),
                (field::SYMBOL, vec![FieldSlot::be(2)]),
                (field::DECIMALS, vec![FieldSlot::be(3)]),
                (field::TOTAL_SUPPLY, vec![FieldSlot::be(4), FieldSlot::be(3)]),
                (
                    field::BALANCES,
                    vec![FieldSlot::be(5), FieldSlot::be(4), FieldSlot::le(5)],
                ),
                (field::ALLOWANCES, vec![FieldSlot::be(6), FieldSlot::be(5)]),
            ],
        )
    }

    /// Pool contracts; the pool is also the LP token
    pub fn pair() -> Self {
        Self::with_fields(
            PAIR_LAYOUT,
            [
                (field::TOKEN0, vec![FieldSlot::be(1)]),
                (field::TOKEN1, vec![FieldSlot::be(2)]),
                (field::RESERVE0, vec![FieldSlot::be(3), FieldSlot::be(4)]),
                (field::RESERVE1, vec![FieldSlot::be(4), FieldSlot::be(5)]),
                (field::DECIMALS, vec![FieldSlot::be(8)]),
                (field::TOTAL_SUPPLY, vec![FieldSlot::be(9), FieldSlot::be(8)]),
                (field::BALANCES, vec![FieldSlot::be(10), FieldSlot::be(9)]),
            ],
        )
    }

    /// Pair registry
    pub fn factory() -> Self {
        Self::with_fields(
            FACTORY_LAYOUT,
            [(field::PAIRS, vec![FieldSlot::be(3), FieldSlot::be(2)])],
        )
    }

    fn with_fields<const N: usize>(name: &str, fields: [(&str, Vec<FieldSlot>); N]) -> Self {
        Self {
            name: name.to_string(),
            version: 1,
            dictionary_roots: default_roots(),
            fields: fields
                .into_iter()
                .map(|(field, slots)| (field.to_string(), slots))
                .collect(),
        }
    }

    /// Slots for a field, empty when the layout does not know it
    pub fn slots(&self, field: &str) -> &[FieldSlot] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Layouts by name
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    layouts: HashMap<String, ContractLayout>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self {
            layouts: HashMap::new(),
        }
    }

    /// Registry with the built-in token, pair and factory layouts
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.insert(ContractLayout::token());
        registry.insert(ContractLayout::pair());
        registry.insert(ContractLayout::factory());
        registry
    }

    /// Add or replace a layout
    pub fn insert(&mut self, layout: ContractLayout) {
        self.layouts.insert(layout.name.clone(), layout);
    }

    pub fn get(&self, name: &str) -> Option<&ContractLayout> {
        self.layouts.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.layouts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Overlay layouts from a JSON array of `ContractLayout`
    pub fn load_overrides(&mut self, json: &str) -> Result<usize, LayoutError> {
        let layouts: Vec<ContractLayout> = serde_json::from_str(json)?;
        let count = layouts.len();
        for layout in layouts {
            self.insert(layout);
        }
        Ok(count)
    }

    pub fn load_overrides_from_file(&mut self, path: &Path) -> Result<usize, LayoutError> {
        let content = std::fs::read_to_string(path)?;
        self.load_overrides(&content)
    }
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
