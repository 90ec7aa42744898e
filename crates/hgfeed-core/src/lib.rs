// hgfeed-core: Session, polling and command engine between hgfeed-api and hosts.

pub mod auth;
pub mod command;
pub mod config;
mod convert;
pub mod device_api;
pub mod error;
pub mod model;
pub mod poller;
pub mod session;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use auth::{AuthClient, AuthState, Credential, PersistedSession, TokenStore};
pub use command::{Ack, CommandDispatcher, CommandKind, CommandRequest};
pub use config::{
    CommandLimits, PollInterval, PortionBounds, RetryPolicy, SessionConfig, TlsVerification,
};
pub use device_api::DeviceApiClient;
pub use error::CoreError;
pub use poller::{PollOutcome, PollingScheduler};
pub use session::Session;
pub use store::DeviceStateCache;

pub use model::{
    Device, DeviceId, DeviceListing, DeviceStatus, ScheduleDraft, ScheduleEntry, ScheduleId,
    WeekdayMask,
};
