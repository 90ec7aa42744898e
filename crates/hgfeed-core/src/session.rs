// ── Session facade ──
//
// One account, one context object. Wires the auth, device-call, cache,
// poller and dispatcher layers together and owns the background poll task.
// Nothing here is global: two sessions never share state.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use hgfeed_api::{FeederClient, TlsMode, TransportConfig};

use crate::auth::{AuthClient, AuthState, Credential, PersistedSession};
use crate::command::{Ack, CommandDispatcher, CommandRequest};
use crate::config::{SessionConfig, TlsVerification};
use crate::device_api::DeviceApiClient;
use crate::error::CoreError;
use crate::model::{Device, DeviceId, DeviceListing, DeviceStatus, ScheduleEntry};
use crate::poller::{PollOutcome, PollingScheduler};
use crate::store::DeviceStateCache;

/// The entry point for hosts.
///
/// Cheaply cloneable via `Arc<SessionInner>`.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    auth: Arc<AuthClient>,
    api: Arc<DeviceApiClient>,
    cache: Arc<DeviceStateCache>,
    poller: Arc<PollingScheduler>,
    dispatcher: CommandDispatcher,
    cancel: CancellationToken,
    poll_task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Session {
    /// Build a session and its HTTP client from `config`.
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| CoreError::Config {
            message: format!("invalid base URL '{}': {e}", config.base_url),
        })?;
        let transport = TransportConfig {
            tls: tls_mode(&config.tls),
            timeout: config.operation_timeout,
            locale: config.locale.clone(),
            timezone: config.timezone.clone(),
            ..TransportConfig::default()
        };
        let api = FeederClient::new(base_url, &transport)?;
        Ok(Self::with_client(config, api))
    }

    /// Build a session around an existing API client. `config.base_url` and
    /// the transport fields are ignored.
    pub fn with_client(config: SessionConfig, api: FeederClient) -> Self {
        let auth = Arc::new(AuthClient::new(
            api.clone(),
            config.token_safety_margin,
            config.default_token_lifetime,
        ));
        let device_api = Arc::new(DeviceApiClient::new(
            api,
            Arc::clone(&auth),
            config.retry.clone(),
            config.effective_request_timeout(),
        ));
        let cache = Arc::new(DeviceStateCache::new());
        let poller = Arc::new(PollingScheduler::new(
            Arc::clone(&device_api),
            Arc::clone(&cache),
            config.poll_interval,
            config.offline_after_failures,
            config.operation_timeout,
        ));
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&device_api),
            Arc::clone(&cache),
            config.limits.clone(),
            config.operation_timeout,
        );

        Self {
            inner: Arc::new(SessionInner {
                config,
                auth,
                api: device_api,
                cache,
                poller,
                dispatcher,
                cancel: CancellationToken::new(),
                poll_task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn auth(&self) -> &Arc<AuthClient> {
        &self.inner.auth
    }

    pub fn cache(&self) -> &Arc<DeviceStateCache> {
        &self.inner.cache
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Log in with a password. The password is not retained.
    pub async fn authenticate(
        &self,
        username: &str,
        password: SecretString,
    ) -> Result<Arc<Credential>, CoreError> {
        self.inner.auth.authenticate(username, password).await
    }

    /// Resume from a stored refresh token. The first call refreshes.
    pub fn restore(&self, session: PersistedSession) {
        self.inner.auth.restore(session);
    }

    /// Stop polling, forget the credential, and drop all cached state.
    pub async fn logout(&self) {
        self.shutdown().await;
        self.inner.auth.logout().await;
        self.inner.cache.clear();
    }

    /// What the host should persist right now, if anything.
    pub fn persisted_session(&self) -> Option<PersistedSession> {
        self.inner.auth.persisted_session()
    }

    /// Fires on every login, refresh, and logout.
    pub fn session_updates(&self) -> watch::Receiver<Option<PersistedSession>> {
        self.inner.auth.subscribe_persisted()
    }

    pub fn auth_state(&self) -> watch::Receiver<AuthState> {
        self.inner.auth.subscribe_state()
    }

    // ── Devices ──────────────────────────────────────────────────────

    /// List the account's devices and register every supported one.
    ///
    /// Returns the registered listings.
    pub async fn discover(&self) -> Result<Vec<DeviceListing>, CoreError> {
        let listings = self.inner.api.list_devices().await?;
        let mut registered = Vec::with_capacity(listings.len());

        for listing in listings {
            if !self.inner.config.supports_model(&listing.model) {
                warn!(
                    device_id = %listing.device_id,
                    model = %listing.model,
                    "unsupported feeder model, not managing it"
                );
                continue;
            }
            if self.inner.poller.register(listing.device_id.clone()) {
                debug!(device_id = %listing.device_id, "device registered");
            }
            registered.push(listing);
        }

        info!(count = registered.len(), "device discovery complete");
        Ok(registered)
    }

    /// List every device on the account without registering anything.
    pub async fn list_devices(&self) -> Result<Vec<DeviceListing>, CoreError> {
        self.inner.api.list_devices().await
    }

    pub fn register_device(&self, device_id: impl Into<DeviceId>) -> bool {
        self.inner.poller.register(device_id.into())
    }

    /// Stop polling a device and drop its cached state.
    pub fn unregister_device(&self, device_id: &DeviceId) -> bool {
        let registered = self.inner.poller.unregister(device_id);
        self.inner.cache.remove(device_id);
        registered
    }

    pub fn registered_devices(&self) -> Vec<DeviceId> {
        self.inner.poller.registered()
    }

    /// Poll every registered device once, now.
    pub async fn refresh_all(&self) -> Vec<(DeviceId, PollOutcome)> {
        self.inner.poller.poll_all().await
    }

    pub async fn refresh_device(&self, device_id: &DeviceId) -> PollOutcome {
        self.inner.poller.poll_device(device_id).await
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Discover devices if none are registered, poll once, then keep
    /// polling in the background until [`shutdown`](Self::shutdown).
    ///
    /// Fails only if discovery fails; individual poll failures show up in
    /// [`device_status`](Self::device_status).
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut task = self.inner.poll_task.lock().await;
        if task.is_some() {
            debug!("session already started");
            return Ok(());
        }

        if self.inner.poller.registered().is_empty() {
            self.discover().await?;
        }
        self.inner.poller.poll_all().await;

        let cancel = self.inner.cancel.child_token();
        let handle = tokio::spawn(Arc::clone(&self.inner.poller).run(cancel.clone()));
        *task = Some((cancel, handle));
        info!(
            devices = self.inner.poller.registered().len(),
            "session started"
        );
        Ok(())
    }

    /// Stop background polling and wait for it to finish.
    pub async fn shutdown(&self) {
        let Some((cancel, handle)) = self.inner.poll_task.lock().await.take() else {
            return;
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "poll task ended abnormally");
        }
        info!("session stopped");
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Last known state of a device. Never touches the network.
    pub fn cached_state(&self, device_id: &DeviceId) -> Result<Arc<Device>, CoreError> {
        self.inner
            .cache
            .get(device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                device_id: device_id.to_string(),
            })
    }

    pub fn device_status(&self, device_id: &DeviceId) -> Option<DeviceStatus> {
        self.inner.cache.status(device_id)
    }

    /// All cached devices, republished on every cache write.
    pub fn devices(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.inner.cache.subscribe()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.cache.snapshot()
    }

    /// Read a device's schedules from the cloud.
    pub async fn list_schedules(
        &self,
        device_id: &DeviceId,
    ) -> Result<Vec<ScheduleEntry>, CoreError> {
        self.inner.api.list_schedules(device_id).await
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn submit_command(&self, request: CommandRequest) -> Result<Ack, CoreError> {
        self.inner.dispatcher.submit(request).await
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn tls_mode(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
