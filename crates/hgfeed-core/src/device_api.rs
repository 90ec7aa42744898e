// ── DeviceApiClient ──
//
// Every device call goes through `call`, which
//   1. obtains a valid access token from the AuthClient,
//   2. on an unauthorized response forces exactly one refresh and retries,
//   3. retries transient failures (including a request that outlives
//      `request_timeout` and a token refresh outage) with bounded backoff,
//   4. translates whatever is left into the core error taxonomy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use tracing::{debug, warn};

use hgfeed_api::FeederClient;

use crate::auth::AuthClient;
use crate::command::{Ack, CommandKind, CommandRequest};
use crate::config::RetryPolicy;
use crate::convert;
use crate::error::CoreError;
use crate::model::{Device, DeviceId, DeviceListing, ScheduleDraft, ScheduleEntry, ScheduleId};

/// Portions used by a manual feed when neither the request nor a cached
/// preference names a count.
pub const DEFAULT_MANUAL_PORTIONS: u8 = 1;

/// What a call is about, for error reporting once retries run out.
#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    Account,
    Device(&'a DeviceId),
}

pub struct DeviceApiClient {
    api: FeederClient,
    auth: Arc<AuthClient>,
    retry: RetryPolicy,
    /// Bound on a single request, so a hung request leaves room for retries.
    request_timeout: Duration,
}

impl DeviceApiClient {
    pub fn new(
        api: FeederClient,
        auth: Arc<AuthClient>,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            api,
            auth,
            retry,
            request_timeout,
        }
    }

    pub fn auth(&self) -> &Arc<AuthClient> {
        &self.auth
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Every device on the account.
    pub async fn list_devices(&self) -> Result<Vec<DeviceListing>, CoreError> {
        let api = &self.api;
        let records = self
            .call(Scope::Account, |token| async move { api.list_devices(&token).await })
            .await?;
        Ok(records.into_iter().map(convert::listing_from_record).collect())
    }

    /// Fresh snapshot of one device. `manual_feed_portions` is set to the
    /// default; the cache carries the real preference over.
    pub async fn get_device_state(&self, device_id: &DeviceId) -> Result<Device, CoreError> {
        let api = &self.api;
        let id = device_id.as_str();
        let scope = Scope::Device(device_id);

        let listing = self
            .list_devices()
            .await?
            .into_iter()
            .find(|d| d.device_id == *device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                device_id: device_id.to_string(),
            })?;

        let (summary, plans) = tokio::try_join!(
            self.call(scope, |token| async move { api.feeder_summary(&token, id).await }),
            self.call(scope, |token| async move { api.list_plans(&token, id).await }),
        )?;

        convert::device_from_parts(
            listing,
            &summary,
            &plans,
            DEFAULT_MANUAL_PORTIONS,
            Utc::now().date_naive(),
        )
    }

    pub async fn list_schedules(&self, device_id: &DeviceId) -> Result<Vec<ScheduleEntry>, CoreError> {
        let api = &self.api;
        let id = device_id.as_str();
        let plans = self
            .call(Scope::Device(device_id), |token| async move {
                api.list_plans(&token, id).await
            })
            .await?;
        convert::schedules_from_plans(&plans)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Send one command to the cloud.
    ///
    /// `SetPortions` has no cloud counterpart and is acknowledged without a
    /// network call; persisting it is the caller's job.
    pub async fn send_command(&self, request: &CommandRequest) -> Result<Ack, CoreError> {
        let device_id = &request.device_id;
        let mut ack = Ack::new(device_id.clone(), &request.kind);

        match &request.kind {
            CommandKind::ManualFeed { portions } => {
                self.manual_feed(device_id, portions.unwrap_or(DEFAULT_MANUAL_PORTIONS))
                    .await?;
            }
            CommandKind::SetPortions { .. } => {}
            CommandKind::ResetDesiccant => self.reset_desiccant(device_id).await?,
            CommandKind::SetFoodRemaining { percent } => {
                self.set_food_remaining(device_id, *percent).await?;
            }
            CommandKind::UpsertSchedule { schedule } => {
                ack.schedule = Some(self.upsert_schedule(device_id, schedule).await?);
            }
            CommandKind::DeleteSchedule { id } => self.delete_schedule(device_id, id).await?,
        }

        ack.confirmed_at = Utc::now();
        Ok(ack)
    }

    pub async fn manual_feed(&self, device_id: &DeviceId, portions: u8) -> Result<(), CoreError> {
        let api = &self.api;
        let id = device_id.as_str();
        self.call(Scope::Device(device_id), |token| async move {
            api.manual_feed(&token, id, portions).await
        })
        .await
    }

    pub async fn reset_desiccant(&self, device_id: &DeviceId) -> Result<(), CoreError> {
        let api = &self.api;
        let id = device_id.as_str();
        self.call(Scope::Device(device_id), |token| async move {
            api.reset_desiccant(&token, id).await
        })
        .await
    }

    pub async fn set_food_remaining(&self, device_id: &DeviceId, percent: u8) -> Result<(), CoreError> {
        let api = &self.api;
        let id = device_id.as_str();
        self.call(Scope::Device(device_id), |token| async move {
            api.set_food_remaining(&token, id, percent).await
        })
        .await
    }

    /// Store a schedule and return it as the cloud recorded it.
    pub async fn upsert_schedule(
        &self,
        device_id: &DeviceId,
        draft: &ScheduleDraft,
    ) -> Result<ScheduleEntry, CoreError> {
        let api = &self.api;
        let id = device_id.as_str();
        let plan = convert::plan_from_draft(draft)?;
        let plan = &plan;
        let stored = self
            .call(Scope::Device(device_id), |token| async move {
                api.save_plan(&token, id, plan).await
            })
            .await?;
        convert::schedule_from_plan(&stored)
    }

    pub async fn delete_schedule(
        &self,
        device_id: &DeviceId,
        schedule_id: &ScheduleId,
    ) -> Result<(), CoreError> {
        let api = &self.api;
        let id = device_id.as_str();
        let plan_id = schedule_id.as_str();
        self.call(Scope::Device(device_id), |token| async move {
            api.delete_plan(&token, id, plan_id).await
        })
        .await
    }

    // ── Call wrapper ─────────────────────────────────────────────────

    async fn call<T, F, Fut>(&self, scope: Scope<'_>, op: F) -> Result<T, CoreError>
    where
        F: Fn(SecretString) -> Fut,
        Fut: Future<Output = Result<T, hgfeed_api::Error>>,
    {
        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            let reason = match self.try_once(&op, &mut refreshed).await {
                Attempt::Done(value) => return Ok(value),
                Attempt::RetryNow => continue,
                Attempt::Failed(err) => return Err(err),
                Attempt::Transient(reason) => reason,
            };

            attempt += 1;
            if attempt >= self.retry.max_attempts {
                warn!(error = %reason, attempts = attempt, "giving up after transient failures");
                return Err(exhausted(scope, reason));
            }

            let delay = self.retry.delay_for(attempt - 1);
            debug!(error = %reason, attempt, ?delay, "transient failure, backing off");
            tokio::time::sleep(delay).await;
        }
    }

    /// One pass: token, request, classification. Token refresh failures
    /// that are not a rejected refresh token count as transient.
    async fn try_once<T, F, Fut>(&self, op: &F, refreshed: &mut bool) -> Attempt<T>
    where
        F: Fn(SecretString) -> Fut,
        Fut: Future<Output = Result<T, hgfeed_api::Error>>,
    {
        let credential = match self.auth.valid_credential().await {
            Ok(credential) => credential,
            Err(CoreError::NetworkError { message }) => return Attempt::Transient(message),
            Err(e) => return Attempt::Failed(e),
        };

        let err = match tokio::time::timeout(self.request_timeout, op(credential.access_token.clone()))
            .await
        {
            Ok(Ok(value)) => return Attempt::Done(value),
            Ok(Err(e)) => e,
            Err(_) => {
                return Attempt::Transient(format!(
                    "no response within {} ms",
                    self.request_timeout.as_millis()
                ));
            }
        };

        if err.is_unauthorized() {
            if *refreshed {
                return Attempt::Failed(CoreError::CommandRejected {
                    reason: format!("still unauthorized after token refresh: {err}"),
                });
            }
            debug!("request unauthorized, forcing one token refresh");
            return match self.auth.refresh_from(credential.generation()).await {
                Ok(_) => {
                    *refreshed = true;
                    Attempt::RetryNow
                }
                // The forced refresh did not happen; the next pass may force it again.
                Err(CoreError::NetworkError { message }) => Attempt::Transient(message),
                Err(e) => Attempt::Failed(e),
            };
        }

        if err.is_transient() {
            Attempt::Transient(err.to_string())
        } else {
            Attempt::Failed(err.into())
        }
    }
}

enum Attempt<T> {
    Done(T),
    /// Credential renewed after an unauthorized response; retry without
    /// counting an attempt.
    RetryNow,
    Transient(String),
    Failed(CoreError),
}

fn exhausted(scope: Scope<'_>, reason: String) -> CoreError {
    match scope {
        Scope::Account => CoreError::NetworkError { message: reason },
        Scope::Device(device_id) => CoreError::DeviceUnreachable {
            device_id: device_id.to_string(),
            reason,
        },
    }
}
