//! Lending configuration

use serde::{Deserialize, Serialize};
use stash_core::AccountType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingConfig {
    /// Envelope types a lender may lend from
    #[serde(default = "default_lendable_types")]
    pub lendable_types: Vec<AccountType>,

    /// Draw order. Lendable types not listed here are drawn last, in
    /// canonical order.
    #[serde(default = "default_priority")]
    pub priority: Vec<AccountType>,
}

fn default_lendable_types() -> Vec<AccountType> {
    vec![AccountType::Fun, AccountType::Daily]
}

fn default_priority() -> Vec<AccountType> {
    vec![AccountType::Fun, AccountType::Daily]
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            lendable_types: default_lendable_types(),
            priority: default_priority(),
        }
    }
}

impl LendingConfig {
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn is_lendable(&self, account_type: AccountType) -> bool {
        self.lendable_types.contains(&account_type)
    }

    /// Sort key for draw order
    pub(crate) fn rank(&self, account_type: AccountType) -> usize {
        self.priority
            .iter()
            .position(|t| *t == account_type)
            .unwrap_or(self.priority.len())
    }
}
