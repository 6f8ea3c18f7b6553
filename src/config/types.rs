//! Configuration types derived once at startup

use anyhow::{bail, Result};
use std::fmt;

pub use crate::chain::{DEFAULT_SCALE_DECIMALS, MAX_SCALE_DECIMALS};

/// Pallet names belonging to one oracle identifier.
///
/// `acala` maps to `acalaOracle` and `operatorMembershipAcala`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleNames {
    pub identifier: String,
    pub oracle_pallet: String,
    pub membership_pallet: String,
}

impl OracleNames {
    pub fn derive(identifier: &str) -> Result<Self> {
        let identifier = identifier.trim();
        let mut chars = identifier.chars();
        let Some(first) = chars.next() else {
            bail!("oracle.name must not be empty");
        };
        if !first.is_ascii_alphabetic() {
            bail!("oracle.name '{}' must start with a letter", identifier);
        }
        if !identifier.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("oracle.name '{}' must be alphanumeric", identifier);
        }

        let capitalized: String = first.to_ascii_uppercase().to_string() + chars.as_str();
        Ok(Self {
            identifier: identifier.to_string(),
            oracle_pallet: format!("{}Oracle", identifier),
            membership_pallet: format!("operatorMembership{}", capitalized),
        })
    }
}

impl fmt::Display for OracleNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.oracle_pallet, self.membership_pallet)
    }
}
