//! Core value types shared across the index.

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of a Tiger digest in bytes.
pub const TTH_LEN: usize = 24;

/// Length of the base32 text form of a TTH (no padding).
pub const TTH_BASE32_LEN: usize = 39;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// 39 symbols carry 195 bits; the low 3 bits of the last symbol are padding
const TRAILING_BITS_MASK: usize = 0b111;

/// Tiger Tree Hash root (or block) digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tth(pub [u8; TTH_LEN]);

/// Reasons a TTH text form is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TthParseError {
    #[error("expected {TTH_BASE32_LEN} base32 characters, got {0}")]
    Length(usize),

    #[error("invalid base32 character {0:?}")]
    Alphabet(char),

    #[error("non-canonical base32 encoding")]
    Encoding,
}

impl Tth {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; TTH_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; TTH_LEN] {
        &self.0
    }

    /// Base32 text form as used in file lists and magnet links
    pub fn to_base32(&self) -> String {
        BASE32_NOPAD.encode(&self.0)
    }

    /// Parse the base32 text form.
    ///
    /// Only upper-case `A-Z2-7` is accepted and the input must be exactly
    /// 39 characters. Padding bits in the last symbol are ignored, as other
    /// clients do not always zero them.
    pub fn from_base32(text: &str) -> Result<Self, TthParseError> {
        if text.len() != TTH_BASE32_LEN {
            return Err(TthParseError::Length(text.chars().count()));
        }
        if let Some(bad) = text
            .chars()
            .find(|c| !matches!(c, 'A'..='Z' | '2'..='7'))
        {
            return Err(TthParseError::Alphabet(bad));
        }
        let mut symbols = text.as_bytes().to_vec();
        if let Some(last) = symbols.last_mut() {
            let value = BASE32_ALPHABET
                .iter()
                .position(|c| c == last)
                .ok_or(TthParseError::Encoding)?;
            *last = BASE32_ALPHABET[value & !TRAILING_BITS_MASK];
        }
        let decoded = BASE32_NOPAD
            .decode(&symbols)
            .map_err(|_| TthParseError::Encoding)?;
        Self::from_bytes(&decoded).ok_or(TthParseError::Encoding)
    }
}

impl fmt::Display for Tth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base32())
    }
}

impl fmt::Debug for Tth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tth({})", self.to_base32())
    }
}

impl FromStr for Tth {
    type Err = TthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base32(s)
    }
}

impl Serialize for Tth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Tth::from_base32(&text).map_err(serde::de::Error::custom)
    }
}
