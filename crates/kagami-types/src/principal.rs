//! Principal type.
//!
//! A `Principal` is any entity that resolves files through a filesystem: a
//! human user, a service account, or the system itself. It is opaque to the
//! VFS contract; backends decide what each principal can see or change.

use serde::{Deserialize, Serialize};

use crate::ids::PrincipalId;

/// An entity that can act on a filesystem.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Globally unique, permanent identifier.
    pub id: PrincipalId,
    /// Short handle used in logs and views: "amy", "backup", "system".
    pub username: String,
    /// Full display name.
    pub display_name: String,
}

impl Principal {
    /// Create a new principal with a fresh ID.
    pub fn new(username: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: PrincipalId::new(),
            username: username.into(),
            display_name: display_name.into(),
        }
    }

    /// Create a principal whose ID is derived from its username.
    ///
    /// Used when an identity is named outside the process (CLI flags, config).
    pub fn named(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            id: PrincipalId::from_name(&username),
            display_name: username.clone(),
            username,
        }
    }

    /// Create the well-known system principal.
    pub fn system() -> Self {
        Self {
            id: PrincipalId::system(),
            username: "system".into(),
            display_name: "System".into(),
        }
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.username, self.display_name)
    }
}
