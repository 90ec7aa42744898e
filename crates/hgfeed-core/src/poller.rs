// ── Polling scheduler ──
//
// One background loop ticks at the poll interval and starts a refresh for
// every registered device. A device whose previous poll is still running
// skips the tick rather than queueing another request. Failures never
// propagate: they only move the device's health counters in the cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollInterval;
use crate::device_api::DeviceApiClient;
use crate::error::CoreError;
use crate::model::DeviceId;
use crate::store::{DeviceStateCache, FailureOutcome, RequestStamp, WriteOutcome};

/// What a single poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Updated,
    /// The result was older than what the cache already holds.
    Superseded,
    /// The previous poll for this device has not finished, or the device
    /// was unregistered before its poll began.
    Skipped,
    Failed {
        consecutive_failures: u32,
        offline: bool,
    },
}

/// Clears the in-flight flag when the poll ends, however it ends.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PollingScheduler {
    api: Arc<DeviceApiClient>,
    cache: Arc<DeviceStateCache>,
    interval: PollInterval,
    offline_after: u32,
    timeout: Duration,
    devices: DashMap<DeviceId, Arc<AtomicBool>>,
}

impl PollingScheduler {
    pub fn new(
        api: Arc<DeviceApiClient>,
        cache: Arc<DeviceStateCache>,
        interval: PollInterval,
        offline_after: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            cache,
            interval,
            offline_after: offline_after.max(1),
            timeout,
            devices: DashMap::new(),
        }
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Start polling a device. Returns `false` if it was already registered.
    pub fn register(&self, device_id: DeviceId) -> bool {
        let mut added = false;
        self.devices.entry(device_id).or_insert_with(|| {
            added = true;
            Arc::new(AtomicBool::new(false))
        });
        added
    }

    pub fn unregister(&self, device_id: &DeviceId) -> bool {
        self.devices.remove(device_id).is_some()
    }

    pub fn registered(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn interval(&self) -> Duration {
        self.interval.get()
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Poll one device now, unless a poll for it is already running.
    /// Polling an unregistered device registers it.
    pub async fn poll_device(&self, device_id: &DeviceId) -> PollOutcome {
        self.register(device_id.clone());
        self.poll_registered(device_id).await
    }

    /// Poll a device only while it is registered. A device unregistered
    /// between a tick and its poll is skipped.
    async fn poll_registered(&self, device_id: &DeviceId) -> PollOutcome {
        let Some(_in_flight) = self.try_begin(device_id) else {
            debug!(device_id = %device_id, "poll in flight or device unregistered, skipping");
            return PollOutcome::Skipped;
        };

        let origin = self.cache.stamp();
        let result = match tokio::time::timeout(self.timeout, self.api.get_device_state(device_id)).await
        {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }),
        };

        match result {
            Ok(device) => match self.cache.apply(device, origin) {
                WriteOutcome::Applied => {
                    debug!(device_id = %device_id, "device state refreshed");
                    PollOutcome::Updated
                }
                WriteOutcome::Superseded => {
                    debug!(device_id = %device_id, "poll result superseded by newer write");
                    PollOutcome::Superseded
                }
            },
            Err(e) => self.record_failure(device_id, origin, &e),
        }
    }

    /// Poll every registered device concurrently and wait for all of them.
    pub async fn poll_all(&self) -> Vec<(DeviceId, PollOutcome)> {
        let ids = self.registered();
        let outcomes =
            futures_util::future::join_all(ids.iter().map(|id| self.poll_registered(id))).await;
        ids.into_iter().zip(outcomes).collect()
    }

    /// Tick until `cancel` fires. Polls run as separate tasks so one slow
    /// device never delays another.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval.get());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await; // consume the immediate first tick

        let mut polls = JoinSet::new();
        info!(interval_secs = self.interval.get().as_secs(), "poller started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    while polls.try_join_next().is_some() {}
                    for device_id in self.registered() {
                        let poller = Arc::clone(&self);
                        polls.spawn(async move {
                            poller.poll_registered(&device_id).await;
                        });
                    }
                }
            }
        }

        // Late results would be discarded by the cache anyway.
        polls.shutdown().await;
        info!("poller stopped");
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn try_begin(&self, device_id: &DeviceId) -> Option<InFlight> {
        let flag = Arc::clone(self.devices.get(device_id)?.value());
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }

    fn record_failure(
        &self,
        device_id: &DeviceId,
        origin: RequestStamp,
        err: &CoreError,
    ) -> PollOutcome {
        let (consecutive_failures, went_offline) =
            match self.cache.record_failure(device_id, origin, self.offline_after) {
                FailureOutcome::Counted {
                    consecutive_failures,
                    went_offline,
                } => (consecutive_failures, went_offline),
                FailureOutcome::Superseded => {
                    debug!(device_id = %device_id, error = %err, "poll failure superseded by newer write");
                    return PollOutcome::Superseded;
                }
                FailureOutcome::Uncached => {
                    warn!(device_id = %device_id, error = %err, "initial poll failed");
                    return PollOutcome::Failed {
                        consecutive_failures: 1,
                        offline: false,
                    };
                }
            };

        if went_offline {
            warn!(
                device_id = %device_id,
                failures = consecutive_failures,
                error = %err,
                "device marked offline after repeated poll failures"
            );
        } else {
            warn!(
                device_id = %device_id,
                failures = consecutive_failures,
                error = %err,
                "poll failed, keeping last known state"
            );
        }

        PollOutcome::Failed {
            consecutive_failures,
            offline: self
                .cache
                .get(device_id)
                .is_some_and(|device| !device.online),
        }
    }
}
