//! Chain-level primitives shared across the crate.

use std::collections::HashMap;

/// A hex account or contract address (`0x…`).
pub type Address = String;

/// A transaction hash (`0x…`).
pub type TxHash = String;

/// Wallet that burned tokens are sent to; its balance is not circulating.
pub const DEAD_ADDRESS: &str = "0x000000000000000000000000000000000000dead";

/// Addresses are compared without regard to checksum casing.
pub fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Short names for well-known contracts.
pub fn default_contract_aliases() -> HashMap<String, Address> {
    let mut aliases = HashMap::new();
    aliases.insert(
        "pye".to_string(),
        "0xaad87f47cdea777faf87e7602e91e3a6afbe4d57".to_string(),
    );
    aliases
}
