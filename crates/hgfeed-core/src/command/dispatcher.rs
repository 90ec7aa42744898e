// ── Command dispatcher ──
//
// Validates, serializes per device, sends, and folds the result back into
// the cache. Commands for different devices run concurrently; commands for
// the same device run one at a time in submission order.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Ack, CommandKind, CommandRequest, validate};
use crate::config::CommandLimits;
use crate::device_api::DeviceApiClient;
use crate::error::CoreError;
use crate::model::DeviceId;
use crate::store::{DeviceStateCache, WriteOutcome};

pub struct CommandDispatcher {
    api: Arc<DeviceApiClient>,
    cache: Arc<DeviceStateCache>,
    limits: CommandLimits,
    timeout: Duration,
    locks: DashMap<DeviceId, Arc<Mutex<()>>>,
}

impl CommandDispatcher {
    pub fn new(
        api: Arc<DeviceApiClient>,
        cache: Arc<DeviceStateCache>,
        limits: CommandLimits,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            cache,
            limits,
            timeout,
            locks: DashMap::new(),
        }
    }

    pub fn limits(&self) -> &CommandLimits {
        &self.limits
    }

    /// Run one command to completion.
    ///
    /// Validation failures return before any network call. On success the
    /// device is re-read and the returned `Ack` carries that snapshot.
    pub async fn submit(&self, request: CommandRequest) -> Result<Ack, CoreError> {
        let cached = self.cache.get(&request.device_id);
        validate(&request, &self.limits, cached.as_deref())?;

        let lock = self.device_lock(&request.device_id);
        let _serial = lock.lock().await;

        let device_id = request.device_id.clone();
        let command = request.kind.name();
        debug!(device_id = %device_id, command, "dispatching command");

        match request.kind {
            CommandKind::SetPortions { portions } => {
                let device = self
                    .cache
                    .set_manual_portions(&device_id, portions)
                    .ok_or_else(|| CoreError::DeviceNotFound {
                        device_id: device_id.to_string(),
                    })?;
                let mut ack = Ack::new(device_id, &request.kind);
                ack.device = Some(device);
                info!(device_id = %ack.device_id, portions, "manual feed portions updated");
                return Ok(ack);
            }
            CommandKind::ManualFeed { portions: None } => {
                // Re-read under the lock so a preceding set_portions is seen.
                let portions = self.cache.get(&device_id).map(|d| d.manual_feed_portions);
                let request = CommandRequest::manual_feed(device_id, portions);
                return self.send_and_refresh(request).await;
            }
            _ => {}
        }

        self.send_and_refresh(request).await
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn send_and_refresh(&self, request: CommandRequest) -> Result<Ack, CoreError> {
        let mut ack = self.with_timeout(self.api.send_command(&request)).await?;
        info!(device_id = %ack.device_id, command = ack.command, "command confirmed");

        let origin = self.cache.stamp();
        match self
            .with_timeout(self.api.get_device_state(&request.device_id))
            .await
        {
            Ok(device) => {
                if self.cache.apply(device, origin) == WriteOutcome::Superseded {
                    debug!(device_id = %ack.device_id, "post-command read superseded");
                }
                ack.device = self.cache.get(&request.device_id);
            }
            Err(e) => {
                warn!(
                    device_id = %ack.device_id,
                    error = %e,
                    "command succeeded but state refresh failed"
                );
            }
        }

        Ok(ack)
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, CoreError>>,
    ) -> Result<T, CoreError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(CoreError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }))
    }

    fn device_lock(&self, device_id: &DeviceId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(device_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}
