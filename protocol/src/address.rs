//! # Addresses
//!
//! 20-byte account and contract identifiers.
//!
//! Account addresses are derived from an Ed25519 verifying key: the last 20
//! bytes of its BLAKE3 hash. Contract addresses are derived from the
//! deploying account and its nonce, so redeploying on a fresh chain yields
//! the same addresses every time.
//!
//! The text form is `0x` followed by 40 lowercase hex digits. Parsing is
//! case-insensitive, so checksummed or upper-case input compares equal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::ADDRESS_LENGTH;
use crate::error::ProtocolError;

const CONTRACT_ADDRESS_CONTEXT: &str = "shroud 2026-01 contract address";

/// Errors from parsing an address string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is not valid hex")]
    InvalidHex,

    #[error("address must be {ADDRESS_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
}

impl From<AddressError> for ProtocolError {
    fn from(e: AddressError) -> Self {
        ProtocolError::OutOfRange(e.to_string())
    }
}

/// An account or contract address.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Never derived from a real key.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Derives the account address of an Ed25519 verifying key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = blake3::hash(public_key);
        let mut out = [0u8; ADDRESS_LENGTH];
        out.copy_from_slice(&digest.as_bytes()[32 - ADDRESS_LENGTH..]);
        Self(out)
    }

    /// Derives the address of the contract `deployer` creates with `nonce`.
    pub fn for_contract(deployer: &Address, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(CONTRACT_ADDRESS_CONTEXT);
        hasher.update(&deployer.0);
        hasher.update(&nonce.to_le_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; ADDRESS_LENGTH];
        out.copy_from_slice(&digest.as_bytes()[32 - ADDRESS_LENGTH..]);
        Self(out)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Abbreviated form for log lines (`0x1234…abcd`).
    pub fn short(&self) -> String {
        let full = hex::encode(self.0);
        format!("0x{}…{}", &full[..4], &full[full.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(digits.to_ascii_lowercase()).map_err(|_| AddressError::InvalidHex)?;
        let arr: [u8; ADDRESS_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; ADDRESS_LENGTH]>::deserialize(deserializer).map(Self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip_is_case_insensitive() {
        let addr = Address::from_bytes([0xAB; ADDRESS_LENGTH]);
        let text = addr.to_hex();
        assert_eq!(text, format!("0x{}", "ab".repeat(20)));
        assert_eq!(text.parse::<Address>().unwrap(), addr);
        assert_eq!(text.to_uppercase().replace("0X", "0x").parse::<Address>().unwrap(), addr);
        assert_eq!("AB".repeat(20).parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn rejects_bad_addresses() {
        assert_eq!("0x1234".parse::<Address>(), Err(AddressError::InvalidLength(2)));
        assert_eq!("0xzz".parse::<Address>(), Err(AddressError::InvalidHex));
        assert_eq!("".parse::<Address>(), Err(AddressError::InvalidLength(0)));
    }

    #[test]
    fn contract_addresses_depend_on_nonce_and_deployer() {
        let deployer = Address::from_public_key(&[7u8; 32]);
        let a = Address::for_contract(&deployer, 0);
        let b = Address::for_contract(&deployer, 1);
        let c = Address::for_contract(&Address::from_public_key(&[8u8; 32]), 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, Address::for_contract(&deployer, 0));
    }

    #[test]
    fn json_uses_hex_string() {
        let addr = Address::from_public_key(&[1u8; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn bincode_uses_raw_bytes() {
        let addr = Address::from_public_key(&[2u8; 32]);
        let bytes = bincode::serialize(&addr).unwrap();
        assert_eq!(bytes.len(), ADDRESS_LENGTH);
        assert_eq!(bincode::deserialize::<Address>(&bytes).unwrap(), addr);
    }
}
