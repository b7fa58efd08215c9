//! Shard-encoded account addresses.
//!
//! Address format (20 bytes):
//! - The leading `SHARD_BYTES` bytes carry the shard number (1..=SHARD_COUNT).
//! - The low nibble of the last byte carries the address type.
//! - The remaining bytes come from the hash of the owner's public key.

use crate::params::{SHARD_BYTES, SHARD_COUNT};
use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::VerifyingKey;
use thiserror::Error;

/// Address length in bytes.
pub const ADDRESS_LEN: usize = 20;

/// The kind of account an address points at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressType {
    External,
    Contract,
    Reserved,
}

/// Errors from address construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address length {0}, want {ADDRESS_LEN}")]
    InvalidLength(usize),

    #[error("invalid shard number {0}, want 1..={SHARD_COUNT}")]
    InvalidShard(u16),
}

/// A 20-byte account identifier.
#[derive(
    Copy,
    Clone,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Address(pub [u8; ADDRESS_LEN]);

/// Largest address reserved for system contracts.
const MAX_SYSTEM_CONTRACT: Address = {
    let mut bytes = [0u8; ADDRESS_LEN];
    bytes[ADDRESS_LEN - 2] = 4;
    bytes[ADDRESS_LEN - 1] = 255;
    Address(bytes)
};

impl Address {
    /// The empty address. Reward transactions use it as their sender.
    pub const EMPTY: Address = Address([0u8; ADDRESS_LEN]);

    /// Build an address from a byte slice, validating length.
    pub fn from_slice(bytes: &[u8]) -> Result<Address, AddressError> {
        if bytes.len() != ADDRESS_LEN {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(bytes);
        Ok(Address(out))
    }

    /// Derive an external account address from a public key on a shard.
    pub fn from_public_key(key: &VerifyingKey, shard: u16) -> Result<Address, AddressError> {
        if !valid_shard(shard) {
            return Err(AddressError::InvalidShard(shard));
        }

        let digest = blake3::hash(key.as_bytes());
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest.as_bytes()[32 - ADDRESS_LEN..]);

        bytes[0] = shard as u8;
        bytes[ADDRESS_LEN - 1] &= 0xF0;
        bytes[ADDRESS_LEN - 1] |= AddressType::External as u8 & 0x0F;
        debug_assert!(SHARD_BYTES == 1, "shard prefix wider than one byte");

        Ok(Address(bytes))
    }

    /// The shard this address lives on. Total: the empty address maps to
    /// shard 0, which is never a valid shard.
    pub fn shard(&self) -> u16 {
        self.0[0] as u16
    }

    pub fn is_empty(&self) -> bool {
        *self == Address::EMPTY
    }

    /// Reserved system-contract range.
    pub fn is_reserved(&self) -> bool {
        !self.is_empty() && *self <= MAX_SYSTEM_CONTRACT
    }

    pub fn is_contract(&self) -> bool {
        self.0[ADDRESS_LEN - 1] & 0x0F == 2
    }

    pub fn address_type(&self) -> AddressType {
        if self.is_reserved() || self.is_empty() {
            return AddressType::Reserved;
        }
        match self.0[ADDRESS_LEN - 1] & 0x0F {
            2 => AddressType::Contract,
            _ => AddressType::External,
        }
    }
}

/// Whether a shard number is valid for this network.
pub fn valid_shard(shard: u16) -> bool {
    shard >= 1 && shard <= SHARD_COUNT
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "0x{:02x}{:02x}..{:02x}{:02x}",
            self.0[0],
            self.0[1],
            self.0[ADDRESS_LEN - 2],
            self.0[ADDRESS_LEN - 1]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    #[test]
    fn derived_address_carries_shard_and_type() {
        for shard in 1..=SHARD_COUNT {
            let addr = Address::from_public_key(&key(7).verifying_key(), shard).unwrap();
            assert_eq!(addr.shard(), shard);
            assert_eq!(addr.address_type(), AddressType::External);
        }
    }

    #[test]
    fn invalid_shard_rejected() {
        let vk = key(1).verifying_key();
        assert_eq!(
            Address::from_public_key(&vk, 0),
            Err(AddressError::InvalidShard(0))
        );
        assert_eq!(
            Address::from_public_key(&vk, SHARD_COUNT + 1),
            Err(AddressError::InvalidShard(SHARD_COUNT + 1))
        );
    }

    #[test]
    fn reserved_range() {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[ADDRESS_LEN - 1] = 1;
        assert!(Address(bytes).is_reserved());
        assert!(!Address::EMPTY.is_reserved());

        let external = Address::from_public_key(&key(3).verifying_key(), 2).unwrap();
        assert!(!external.is_reserved());
    }

    #[test]
    fn different_keys_differ() {
        let a = Address::from_public_key(&key(1).verifying_key(), 1).unwrap();
        let b = Address::from_public_key(&key(2).verifying_key(), 1).unwrap();
        assert_ne!(a, b);
    }
}
