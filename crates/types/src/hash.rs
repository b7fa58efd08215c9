//! Content-addressed hashes.

use borsh::{BorshDeserialize, BorshSerialize};

/// Hash length in bytes.
pub const HASH_LEN: usize = 32;

/// A 32-byte blake3 hash.
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
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// The all-zero hash.
    pub const ZERO: Hash = Hash([0u8; HASH_LEN]);

    /// Hash raw bytes.
    pub fn of_bytes(bytes: &[u8]) -> Hash {
        Hash(*blake3::hash(bytes).as_bytes())
    }

    /// Hash the canonical (borsh) encoding of a value.
    pub fn of<T: BorshSerialize>(value: &T) -> Hash {
        let bytes = borsh::to_vec(value).expect("borsh encoding is infallible for chain types");
        Hash::of_bytes(&bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Hash::ZERO
    }

    /// The hash interpreted as a big-endian 64-bit lane at the given index
    /// (0..=3). Used by consensus to seed deterministic generators.
    pub fn lane(&self, index: usize) -> u64 {
        let start = (index % 4) * 8;
        u64::from_be_bytes(self.0[start..start + 8].try_into().expect("8-byte lane"))
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form keeps log lines readable.
        write!(
            f,
            "0x{:02x}{:02x}{:02x}{:02x}..{:02x}{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[30], self.0[31]
        )
    }
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Hash(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = Hash::of(&(1u64, "abc".to_string()));
        let b = Hash::of(&(1u64, "abc".to_string()));
        assert_eq!(a, b);
        assert_ne!(a, Hash::of(&(2u64, "abc".to_string())));
    }

    #[test]
    fn lanes_cover_the_digest() {
        let h = Hash::of_bytes(b"lane test");
        let mut rebuilt = [0u8; HASH_LEN];
        for i in 0..4 {
            rebuilt[i * 8..(i + 1) * 8].copy_from_slice(&h.lane(i).to_be_bytes());
        }
        assert_eq!(rebuilt, h.0);
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(format!("{}", Hash::ZERO), format!("0x{}", "00".repeat(32)));
    }
}
