//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for public keys and session identifiers.
//! Each newtype checks its input at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Characters allowed in base58 encoded public keys (no `0`, `O`, `I`, `l`)
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Encoded 32-byte public keys are between 32 and 44 base58 characters long
const MIN_KEY_LEN: usize = 32;
const MAX_KEY_LEN: usize = 44;

fn validate_base58_key(value: &str) -> Result<(), String> {
    if value.len() < MIN_KEY_LEN || value.len() > MAX_KEY_LEN {
        return Err(format!(
            "{value} (expected {MIN_KEY_LEN}..={MAX_KEY_LEN} characters, got {})",
            value.len()
        ));
    }
    if let Some(bad) = value.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
        return Err(format!("{value} (character '{bad}' is not base58)"));
    }
    Ok(())
}

// ============================================================================
// Public key types
// ============================================================================

/// Public key of a storage account on the network
///
/// Stored in its base58 string form, which is also the identity used by
/// the local cache and the action tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageAccountKey(String);

impl StorageAccountKey {
    /// Create a new StorageAccountKey after validating the base58 form
    pub fn new(value: String) -> Result<Self, DomainError> {
        validate_base58_key(&value).map_err(DomainError::InvalidAccountKey)?;
        Ok(Self(value))
    }

    /// Get the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StorageAccountKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StorageAccountKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim().to_string())
    }
}

impl TryFrom<String> for StorageAccountKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StorageAccountKey> for String {
    fn from(key: StorageAccountKey) -> Self {
        key.0
    }
}

/// Address of the wallet owning the current session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerAddress(String);

impl OwnerAddress {
    /// Create a new OwnerAddress after validating the base58 form
    pub fn new(value: String) -> Result<Self, DomainError> {
        validate_base58_key(&value).map_err(DomainError::InvalidAccountKey)?;
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OwnerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim().to_string())
    }
}

impl TryFrom<String> for OwnerAddress {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerAddress> for String {
    fn from(owner: OwnerAddress) -> Self {
        owner.0
    }
}

// ============================================================================
// Session identifier
// ============================================================================

/// Identifier for a client session (one per connected principal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random SessionId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid SessionId: {e}")))
    }
}
