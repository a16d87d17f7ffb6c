//! # Ciphertext Codec
//!
//! Opaque values exchanged with the coprocessor: 32-byte ciphertext handles,
//! the input proof that accompanies a freshly encrypted batch, and the
//! bundle that carries both.
//!
//! Nothing here knows what a handle refers to. Handles are compared,
//! hashed, hex-encoded and packed into a compact binary frame; everything
//! else is the coprocessor's business.
//!
//! ## Handle layout
//!
//! ```text
//! [ 0 .. 30 )  digest       assigned by the coprocessor
//! [ 30 ]       type tag     FheType discriminant
//! [ 31 ]       version      HANDLE_VERSION
//! ```
//!
//! The all-zero handle is reserved: it stands for a balance that was never
//! written and always decrypts to zero.
//!
//! ## Bundle frame
//!
//! ```text
//! u32 BE   handle count N
//! N × 32   handles
//! u32 BE   proof length L
//! L        proof bytes
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::{HANDLE_LENGTH, MAX_BATCH_SIZE, MAX_INPUT_PROOF_LENGTH};
use crate::error::ProtocolError;

/// Version byte stamped into every handle this codec produces.
pub const HANDLE_VERSION: u8 = 0;

const TYPE_TAG_OFFSET: usize = 30;
const VERSION_OFFSET: usize = 31;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid hex encoding")]
    InvalidHex,

    #[error("handle must be {HANDLE_LENGTH} bytes, got {0}")]
    InvalidHandleLength(usize),

    #[error("frame truncated: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    #[error("bundle holds {0} handles, limit is {MAX_BATCH_SIZE}")]
    TooManyHandles(usize),

    #[error("proof is {0} bytes, limit is {MAX_INPUT_PROOF_LENGTH}")]
    ProofTooLarge(usize),
}

impl From<CodecError> for ProtocolError {
    fn from(e: CodecError) -> Self {
        ProtocolError::InvalidProof(e.to_string())
    }
}

/// Plaintext type a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FheType {
    Bool = 0,
    Uint64 = 5,
}

impl FheType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FheType::Bool),
            5 => Some(FheType::Uint64),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// CiphertextHandle
// ---------------------------------------------------------------------------

/// Opaque reference to an encrypted value held by the coprocessor.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CiphertextHandle([u8; HANDLE_LENGTH]);

impl CiphertextHandle {
    /// The reserved "never written" handle.
    pub const ZERO: CiphertextHandle = CiphertextHandle([0u8; HANDLE_LENGTH]);

    pub const fn from_bytes(bytes: [u8; HANDLE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Builds a handle from a coprocessor digest, stamping type and version.
    pub fn from_digest(digest: &[u8; 32], fhe_type: FheType) -> Self {
        let mut bytes = *digest;
        bytes[TYPE_TAG_OFFSET] = fhe_type as u8;
        bytes[VERSION_OFFSET] = HANDLE_VERSION;
        Self(bytes)
    }

    pub fn try_from_slice(slice: &[u8]) -> Result<Self, CodecError> {
        let bytes: [u8; HANDLE_LENGTH] = slice
            .try_into()
            .map_err(|_| CodecError::InvalidHandleLength(slice.len()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; HANDLE_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HANDLE_LENGTH]
    }

    /// The type tag, or `None` for the zero handle and unknown tags.
    pub fn fhe_type(&self) -> Option<FheType> {
        if self.is_zero() {
            return None;
        }
        FheType::from_tag(self.0[TYPE_TAG_OFFSET])
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for CiphertextHandle {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("0x");
        let bytes = hex::decode(digits).map_err(|_| CodecError::InvalidHex)?;
        Self::try_from_slice(&bytes)
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.0);
        write!(f, "CiphertextHandle(0x{}…)", &hex[..12])
    }
}

impl Serialize for CiphertextHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for CiphertextHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; HANDLE_LENGTH]>::deserialize(deserializer).map(Self)
        }
    }
}

// ---------------------------------------------------------------------------
// InputProof
// ---------------------------------------------------------------------------

/// Validity proof covering every handle of one encrypted batch.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct InputProof(Vec<u8>);

impl InputProof {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CodecError> {
        if bytes.len() > MAX_INPUT_PROOF_LENGTH {
            return Err(CodecError::ProofTooLarge(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let bytes = hex::decode(s.trim().trim_start_matches("0x")).map_err(|_| CodecError::InvalidHex)?;
        Self::new(bytes)
    }
}

impl fmt::Debug for InputProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputProof({} bytes)", self.0.len())
    }
}

impl Serialize for InputProof {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for InputProof {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = Vec::<u8>::deserialize(deserializer)?;
            Self::new(bytes).map_err(serde::de::Error::custom)
        }
    }
}

// ---------------------------------------------------------------------------
// CiphertextBundle
// ---------------------------------------------------------------------------

/// Ordered handles plus the single proof produced with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiphertextBundle {
    pub handles: Vec<CiphertextHandle>,
    pub proof: InputProof,
}

impl CiphertextBundle {
    pub fn new(handles: Vec<CiphertextHandle>, proof: InputProof) -> Self {
        Self { handles, proof }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Packs the bundle into its binary frame.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.handles.len() > MAX_BATCH_SIZE {
            return Err(CodecError::TooManyHandles(self.handles.len()));
        }
        let mut out =
            Vec::with_capacity(8 + self.handles.len() * HANDLE_LENGTH + self.proof.len());
        out.extend_from_slice(&(self.handles.len() as u32).to_be_bytes());
        for handle in &self.handles {
            out.extend_from_slice(handle.as_bytes());
        }
        out.extend_from_slice(&(self.proof.len() as u32).to_be_bytes());
        out.extend_from_slice(self.proof.as_bytes());
        Ok(out)
    }

    /// Unpacks a frame produced by [`CiphertextBundle::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader { buf: bytes };

        let count = reader.u32()? as usize;
        if count > MAX_BATCH_SIZE {
            return Err(CodecError::TooManyHandles(count));
        }
        let handles = (0..count)
            .map(|_| reader.take(HANDLE_LENGTH).and_then(CiphertextHandle::try_from_slice))
            .collect::<Result<Vec<_>, _>>()?;

        let proof_len = reader.u32()? as usize;
        if proof_len > MAX_INPUT_PROOF_LENGTH {
            return Err(CodecError::ProofTooLarge(proof_len));
        }
        let proof = InputProof(reader.take(proof_len)?.to_vec());

        if !reader.buf.is_empty() {
            return Err(CodecError::TrailingBytes(reader.buf.len()));
        }
        Ok(Self { handles, proof })
    }
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.buf.len() < n {
            return Err(CodecError::Truncated {
                needed: n - self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
