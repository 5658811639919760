//! Notification payloads and their release bookkeeping.

mod types;

pub use types::{DeliveryChain, Notification, NoopRecycler, NotificationRecycler};
