//! LISTEN/NOTIFY bridge for cross-process change events
//!
//! The database pushes asynchronous change events on a fixed set of logical
//! channels; the bridge dispatches them to registered in-process listeners.

mod bridge;

pub use bridge::{CHANNELS, NotificationBridge, NotificationPayload};
