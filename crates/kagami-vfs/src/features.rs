//! Optional capabilities a [`File`](crate::File) may expose.

/// A node that can carry the reason it is being manipulated.
///
/// Backends that support it attach the reason to the log records of every
/// mutating call made through the same handle.
pub trait Reasoned {
    fn set_reason(&self, reason: Option<String>);
    fn reason(&self) -> Option<String>;
}
