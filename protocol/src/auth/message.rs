//! The structured message a balance owner signs to authorize a decryption.
//!
//! Layout follows the typed-data convention wallets already understand: a
//! domain separator plus a typed struct, hashed as
//!
//! ```text
//! digest = SHA-256(0x19 0x01 || domain_hash || struct_hash)
//! ```
//!
//! The struct binds the ephemeral public key, the contract allow-list and
//! the validity window. Changing any of them changes the digest, so a
//! signature cannot be lifted onto a different key, contract set or window.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::{DECRYPTION_DOMAIN_NAME, DECRYPTION_DOMAIN_VERSION};
use crate::crypto::hash::{sha256, sha256_concat};

const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const REQUEST_TYPE: &str = "UserDecryptRequestVerification(bytes publicKey,address[] contractAddresses,int256 startTimestamp,uint256 durationDays)";

const SECONDS_PER_DAY: i64 = 86_400;

/// Domain separator of decryption requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    /// Address of the decryption oracle's verifying contract.
    pub verifying_contract: Address,
}

impl DecryptionDomain {
    pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: DECRYPTION_DOMAIN_NAME.to_string(),
            version: DECRYPTION_DOMAIN_VERSION.to_string(),
            chain_id,
            verifying_contract,
        }
    }

    pub fn separator(&self) -> [u8; 32] {
        sha256_concat(&[
            &sha256(DOMAIN_TYPE.as_bytes()),
            &sha256(self.name.as_bytes()),
            &sha256(self.version.as_bytes()),
            &u256(self.chain_id),
            &address_word(&self.verifying_contract),
        ])
    }
}

/// The typed struct the owner signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDecryptRequest {
    /// X25519 public key the oracle seals plaintexts to.
    pub public_key: [u8; 32],
    pub contract_addresses: Vec<Address>,
    /// Window start, unix seconds.
    pub start_timestamp: i64,
    pub duration_days: u32,
}

impl UserDecryptRequest {
    pub fn struct_hash(&self) -> [u8; 32] {
        let contracts: Vec<[u8; 32]> = self.contract_addresses.iter().map(address_word).collect();
        let contract_refs: Vec<&[u8]> = contracts.iter().map(|w| w.as_slice()).collect();

        sha256_concat(&[
            &sha256(REQUEST_TYPE.as_bytes()),
            &sha256(&self.public_key),
            &sha256_concat(&contract_refs),
            &int256(self.start_timestamp),
            &u256(u64::from(self.duration_days)),
        ])
    }

    /// The 32 bytes that get signed.
    pub fn digest(&self, domain: &DecryptionDomain) -> [u8; 32] {
        sha256_concat(&[&[0x19u8, 0x01], &domain.separator(), &self.struct_hash()])
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.start_timestamp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// First instant at which the grant is no longer valid.
    pub fn window_end(&self) -> DateTime<Utc> {
        let end = self
            .start_timestamp
            .saturating_add(i64::from(self.duration_days) * SECONDS_PER_DAY);
        Utc.timestamp_opt(end, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// `[start, start + duration)` contains `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_start() && now < self.window_end()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_end()
    }

    pub fn duration(&self) -> Duration {
        Duration::days(i64::from(self.duration_days))
    }
}

fn u256(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Two's-complement 256-bit word, sign-extended from `value`.
fn int256(value: i64) -> [u8; 32] {
    let mut word = if value < 0 { [0xffu8; 32] } else { [0u8; 32] };
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}
