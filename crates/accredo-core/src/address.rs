//! Wallet addresses
//!
//! Addresses are 20-byte EVM account identifiers. Input is accepted with or
//! without the `0x` prefix and in any letter case; the canonical form is
//! `0x` followed by 40 lowercase hex characters.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

use crate::error::AccredoError;

/// A normalized 20-byte wallet address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletAddress([u8; 20]);

impl WalletAddress {
    /// Parse an address, normalizing case and prefix
    pub fn parse(input: &str) -> Result<Self, AccredoError> {
        let trimmed = input.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if hex_part.len() != 40 {
            return Err(AccredoError::InvalidAddress(format!(
                "expected 40 hex characters, got {}",
                hex_part.len()
            )));
        }

        let bytes = hex::decode(hex_part.to_ascii_lowercase())
            .map_err(|e| AccredoError::InvalidAddress(e.to_string()))?;

        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Canonical `0x`-prefixed lowercase form
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// The address left-padded to a 32-byte ABI word
    pub fn to_abi_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for WalletAddress {
    type Err = AccredoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for WalletAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
