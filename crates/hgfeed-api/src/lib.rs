// hgfeed-api: Async Rust client for the HGSmart pet feeder cloud API

pub mod auth;
pub mod client;
pub mod devices;
pub mod error;
pub mod models;
pub mod schedules;
pub mod transport;

pub use client::{AppCredentials, DEFAULT_BASE_URL, FeederClient};
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
