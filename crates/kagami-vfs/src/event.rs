//! Change notifications.
//!
//! Backends describe each mutation with an [`Event`] and hand it to the
//! filesystem's [`EventSink`]. Delivery (queueing, fan-out, subscriber
//! filtering) belongs to whatever dispatcher sits behind the sink; this module
//! only fixes the payload.
//!
//! Mutations are bracketed: a `done == false` event before the backend acts,
//! and a `done == true` event once it has succeeded. A failed mutation only
//! produces the first.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::VfsResult;
use crate::file::FileHandle;

/// Kind of change. Open-ended: backends may grow new kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum EventType {
    /// A node came into existence.
    Created,
    /// A node's content changed.
    Modified,
    /// A node was removed.
    Deleted,
    /// A node was relocated; the event carries the source.
    Moved,
}

/// An immutable change notification.
#[derive(Clone)]
pub struct Event {
    event_type: EventType,
    file: FileHandle,
    done: bool,
}

impl Event {
    /// Create an event.
    pub fn new(event_type: EventType, file: FileHandle, done: bool) -> Self {
        Self {
            event_type,
            file,
            done,
        }
    }

    /// Notification sent before the change happens.
    pub fn started(event_type: EventType, file: FileHandle) -> Self {
        Self::new(event_type, file, false)
    }

    /// Notification sent after the change succeeded.
    pub fn finished(event_type: EventType, file: FileHandle) -> Self {
        Self::new(event_type, file, true)
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn file(&self) -> &FileHandle {
        &self.file
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("event_type", &self.event_type)
            .field("path", &self.file.path())
            .field("done", &self.done)
            .finish()
    }
}

/// Receives events from a filesystem.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: Event) {}
}

/// Keeps every event in memory, in publication order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for EventLog {
    fn publish(&self, event: Event) {
        tracing::trace!(?event, "event");
        self.events.lock().push(event);
    }
}

/// Run `op` bracketed by a started/finished pair of events.
pub(crate) fn bracket<T>(
    sink: &dyn EventSink,
    event_type: EventType,
    file: FileHandle,
    op: impl FnOnce() -> VfsResult<T>,
) -> VfsResult<T> {
    sink.publish(Event::started(event_type, file.clone()));
    let value = op()?;
    sink.publish(Event::finished(event_type, file));
    Ok(value)
}
