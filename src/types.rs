//! Shared identifier types.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

/// Opaque, hex-encoded continuation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationId(String);

impl ContinuationId {
    /// Hex-encode raw identifier bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContinuationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ContinuationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ContinuationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContinuationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Deref for ContinuationId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a logical client session owning a scope holder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
