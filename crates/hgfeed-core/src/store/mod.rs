// ── Reactive device state ──

mod cache;

pub use cache::{DeviceStateCache, FailureOutcome, RequestStamp, WriteOutcome};
