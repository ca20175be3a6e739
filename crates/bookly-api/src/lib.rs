// bookly-api: Async Rust client for the Bookly booking backend (REST + live change feed)

pub mod client;
pub mod error;
pub mod live;
pub mod transport;
pub mod types;

pub use client::BackendClient;
pub use error::Error;
pub use live::{ChangeEvent, LiveFeedHandle, ReconnectConfig, Subscription};
pub use types::*;
