// ── Runtime session configuration ──
//
// These types describe how a session talks to the cloud and how hard it
// tries. They never touch disk: the host (CLI, daemon, tests) builds a
// `SessionConfig` and hands it to `Session::new`.

use std::fmt;
use std::time::Duration;

use tracing::warn;

use hgfeed_api::DEFAULT_BASE_URL;

/// Polling cadence used when nothing else is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
/// Lowest cadence the vendor tolerates before rate-limiting.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Floor for a derived per-request timeout.
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(250);

// ── Poll interval ────────────────────────────────────────────────────

/// A poll interval that is never below [`MIN_POLL_INTERVAL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval(Duration);

impl PollInterval {
    /// Clamp `requested` up to the floor. The flag is `true` when clamping
    /// happened.
    pub fn new(requested: Duration) -> (Self, bool) {
        if requested < MIN_POLL_INTERVAL {
            (Self(MIN_POLL_INTERVAL), true)
        } else {
            (Self(requested), false)
        }
    }

    /// Like [`new`](Self::new), logging a warning when the value is raised.
    pub fn from_secs(secs: u64) -> Self {
        let (interval, clamped) = Self::new(Duration::from_secs(secs));
        if clamped {
            warn!(
                requested_secs = secs,
                floor_secs = MIN_POLL_INTERVAL.as_secs(),
                "poll interval below floor, clamping"
            );
        }
        interval
    }

    pub fn get(self) -> Duration {
        self.0
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self(DEFAULT_POLL_INTERVAL)
    }
}

// ── Retry policy ─────────────────────────────────────────────────────

/// Bounded exponential backoff for transient device-call failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    /// Spread delays by up to ±25% so concurrent callers do not retry in step.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            jitter: false,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    ///
    /// Jitter is deterministic per attempt number so tests can assert on it.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        let jitter = if self.jitter {
            1.0 + 0.25 * (f64::from(retry) * 7.3).sin()
        } else {
            1.0
        };
        let secs = (base * jitter).min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

// ── Command bounds ───────────────────────────────────────────────────

/// Inclusive portion range accepted by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortionBounds {
    pub min: u8,
    pub max: u8,
}

impl PortionBounds {
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    pub fn contains(self, portions: u8) -> bool {
        (self.min..=self.max).contains(&portions)
    }
}

impl fmt::Display for PortionBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

/// Locally known device constraints checked before any command is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLimits {
    pub manual_feed_portions: PortionBounds,
    pub schedule_portions: PortionBounds,
    pub schedule_slots: usize,
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            manual_feed_portions: PortionBounds::new(1, 10),
            schedule_portions: PortionBounds::new(1, 9),
            schedule_slots: 6,
        }
    }
}

// ── Transport ────────────────────────────────────────────────────────

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (intercepting proxies only).
    DangerAcceptInvalid,
}

// ── Session config ───────────────────────────────────────────────────

/// Configuration for one account session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// API root, e.g. `https://hgsmart.net/hsapi`.
    pub base_url: String,
    pub tls: TlsVerification,
    /// Sent as `Accept-Language`.
    pub locale: String,
    /// IANA zone sent as `Zoneid`.
    pub timezone: String,
    pub poll_interval: PollInterval,
    /// Consecutive failed polls before a device is reported offline.
    pub offline_after_failures: u32,
    /// Upper bound for a single poll or command, retries included.
    pub operation_timeout: Duration,
    /// Upper bound for one HTTP request inside an operation. `None` derives
    /// it from `operation_timeout` and the retry policy.
    pub request_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    /// Refresh this long before the access token's recorded expiry.
    pub token_safety_margin: Duration,
    /// Assumed access token lifetime when the cloud does not report one.
    pub default_token_lifetime: Duration,
    pub limits: CommandLimits,
    /// Models the session registers on discovery. Empty accepts every model.
    pub supported_models: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            tls: TlsVerification::default(),
            locale: "it-IT".into(),
            timezone: "Europe/Rome".into(),
            poll_interval: PollInterval::default(),
            offline_after_failures: 3,
            operation_timeout: Duration::from_secs(10),
            request_timeout: None,
            retry: RetryPolicy::default(),
            token_safety_margin: Duration::from_secs(60),
            default_token_lifetime: Duration::from_secs(2 * 60 * 60),
            limits: CommandLimits::default(),
            supported_models: vec!["S25D".into()],
        }
    }
}

impl SessionConfig {
    /// Per-request timeout. When derived, every attempt plus the backoff
    /// between them fits in `operation_timeout`, with one request slot left
    /// over for a token refresh.
    pub fn effective_request_timeout(&self) -> Duration {
        if let Some(timeout) = self.request_timeout {
            return timeout;
        }
        let attempts = self.retry.max_attempts.max(1);
        let backoff: Duration = (0..attempts - 1).map(|retry| self.retry.delay_for(retry)).sum();
        let budget = self.operation_timeout.saturating_sub(backoff);
        let derived = if budget.is_zero() {
            self.operation_timeout / attempts
        } else {
            budget / (attempts + 1)
        };
        derived.max(MIN_REQUEST_TIMEOUT)
    }

    /// Whether devices of `model` are managed by this session.
    pub fn supports_model(&self, model: &str) -> bool {
        self.supported_models.is_empty()
            || self
                .supported_models
                .iter()
                .any(|m| m.eq_ignore_ascii_case(model))
    }
}
