//! Shared identity types for kagami.
//!
//! A leaf crate with **no internal kagami dependencies**. The VFS crate threads
//! a [`Principal`] through resolution; what a principal is allowed to see is
//! decided entirely by the backend, so this crate only fixes the shape of the
//! identity, never any policy.
//!
//! |-----------------|------------------------------------------------|
//! | Type            | Purpose                                        |
//! |-----------------|------------------------------------------------|
//! | [`Principal`]   | Full identity (id + username + display_name)   |
//! | [`PrincipalId`] | Who (user, service, system)                    |
//! |-----------------|------------------------------------------------|

pub mod ids;
pub mod principal;

pub use ids::PrincipalId;
pub use principal::Principal;
