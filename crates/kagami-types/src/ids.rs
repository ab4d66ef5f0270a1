//! Typed principal identifier.
//!
//! `PrincipalId` wraps a UUIDv7 (time-ordered, globally unique). Identities that
//! must be stable across processes (the system principal, principals named on
//! the command line) are derived with UUIDv5 from a fixed namespace instead.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A principal identifier (UUIDv7, or UUIDv5 for derived identities).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(uuid::Uuid);

/// Fixed namespace for deriving deterministic PrincipalIds via UUIDv5.
const KAGAMI_PRINCIPAL_NS: uuid::Uuid = uuid::uuid!("3f0b9d52-6c1e-4a7b-9e28-d54a17c0b8e3");

impl PrincipalId {
    /// Create a new time-ordered ID (UUIDv7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Derive a deterministic ID from a name.
    ///
    /// The same name always yields the same ID, in every process.
    pub fn from_name(name: &str) -> Self {
        Self(uuid::Uuid::new_v5(&KAGAMI_PRINCIPAL_NS, name.as_bytes()))
    }

    /// The well-known "system" principal.
    pub fn system() -> Self {
        Self::from_name("system")
    }

    /// First 8 hex characters, for human display only.
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }

    /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        uuid::Uuid::parse_str(s).map(Self)
    }

    /// A nil / zero ID for sentinel values.
    pub fn nil() -> Self {
        Self(uuid::Uuid::nil())
    }

    /// Check if this is the nil ID.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<uuid::Uuid> for PrincipalId {
    fn from(u: uuid::Uuid) -> Self {
        Self(u)
    }
}

impl From<PrincipalId> for uuid::Uuid {
    fn from(id: PrincipalId) -> uuid::Uuid {
        id.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrincipalId({})", self.short())
    }
}
