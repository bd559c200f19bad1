//! Common utilities and types shared across the application.

pub mod error;
pub mod events;

pub use events::{event_channel, EventSink, EventStream, LinkEvent, LinkEventKind};
