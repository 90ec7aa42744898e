// HGSmart cloud HTTP client
//
// Wraps `reqwest::Client` with URL construction, bearer injection and
// envelope unwrapping. Endpoint groups (auth, devices, schedules) are
// inherent methods implemented in their own files so this module stays
// focused on transport mechanics.

use reqwest::RequestBuilder;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{CODE_OK, CODE_TOKEN_EXPIRED, Envelope};
use crate::transport::{TransportConfig, header_value};

/// Production endpoint of the HGSmart cloud.
pub const DEFAULT_BASE_URL: &str = "https://hgsmart.net/hsapi";

const BODY_PREVIEW_CHARS: usize = 200;

/// OAuth client identity of the vendor's mobile app.
///
/// The cloud only issues tokens to this identity; it is not a user secret
/// but it is still kept out of logs.
#[derive(Debug, Clone)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl Default for AppCredentials {
    fn default() -> Self {
        Self {
            client_id: "r3ptinrmmsl9rnlis6yf".into(),
            client_secret: SecretString::from("ss9Ytzb4gSceaPhwhKteAPLiVP4pmU8zxLEcWuscM6Vsnj7wMt"),
        }
    }
}

/// Raw HTTP client for the HGSmart cloud.
///
/// Stateless with respect to credentials: every authenticated method takes
/// the access token explicitly, so token lifecycle lives entirely in the
/// caller. Cloning is cheap (the inner `reqwest::Client` is reference-counted).
#[derive(Debug, Clone)]
pub struct FeederClient {
    http: reqwest::Client,
    base_url: Url,
    app: AppCredentials,
}

impl FeederClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the API root, e.g. `https://hgsmart.net/hsapi`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, AppCredentials::default()))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, app: AppCredentials) -> Self {
        Self {
            http,
            base_url,
            app,
        }
    }

    /// Convenience constructor for a string base URL with default transport.
    pub fn from_url(base_url: &str) -> Result<Self, Error> {
        Self::new(Url::parse(base_url)?, &TransportConfig::default())
    }

    /// The API root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn app(&self) -> &AppCredentials {
        &self.app
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/{path}`, tolerating a trailing slash on the base.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let full = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&full)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Attach the app identity and bearer token.
    ///
    /// The cloud expects the literal `Bearer null` on unauthenticated calls.
    pub(crate) fn authorize(
        &self,
        request: RequestBuilder,
        token: Option<&SecretString>,
    ) -> Result<RequestBuilder, Error> {
        let request = request.header("Client", header_value("Client", &self.app.client_id)?);
        Ok(match token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request.header(AUTHORIZATION, "Bearer null"),
        })
    }

    /// Send a GET request and unwrap the envelope.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &SecretString,
    ) -> Result<Option<T>, Error> {
        let url = self.api_url(path)?;
        debug!("GET {url}");

        let resp = self
            .authorize(self.http.get(url), Some(token))?
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_envelope(resp).await
    }

    /// Send a POST request with JSON body and unwrap the envelope.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&SecretString>,
        body: &impl Serialize,
    ) -> Result<Option<T>, Error> {
        let url = self.api_url(path)?;
        debug!("POST {url}");

        let resp = self
            .authorize(self.http.post(url), token)?
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_envelope(resp).await
    }

    /// Send a PUT request with an optional JSON body and unwrap the envelope.
    pub(crate) async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &SecretString,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<T>, Error> {
        let url = self.api_url(path)?;
        debug!("PUT {url}");

        let mut request = self.authorize(self.http.put(url), Some(token))?;
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await.map_err(Error::Transport)?;

        parse_envelope(resp).await
    }

    /// Send a PUT request with a multipart form and unwrap the envelope.
    pub(crate) async fn put_form<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &SecretString,
        form: reqwest::multipart::Form,
    ) -> Result<Option<T>, Error> {
        let url = self.api_url(path)?;
        debug!("PUT {url} (multipart)");

        let resp = self
            .authorize(self.http.put(url), Some(token))?
            .multipart(form)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_envelope(resp).await
    }

    /// Send a DELETE request and unwrap the envelope.
    pub(crate) async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &SecretString,
    ) -> Result<Option<T>, Error> {
        let url = self.api_url(path)?;
        debug!("DELETE {url}");

        let resp = self
            .authorize(self.http.delete(url), Some(token))?
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_envelope(resp).await
    }
}

/// Parse the `{ code, msg, data }` envelope.
///
/// Returns `data` (which may be absent) when `code == 200`.
async fn parse_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Option<T>, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Unauthorized {
            message: "access token rejected".into(),
        });
    }

    let body = resp.text().await.map_err(Error::Transport)?;

    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            message: preview(&body),
        });
    }

    let envelope: Envelope<T> =
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.clone(),
        })?;

    let Envelope { code, msg, data } = envelope;
    let message = || msg.clone().unwrap_or_else(|| format!("code={code}"));
    match code {
        CODE_OK => Ok(data),
        CODE_TOKEN_EXPIRED => Err(Error::Unauthorized { message: message() }),
        code => Err(Error::Vendor {
            code,
            message: message(),
        }),
    }
}

/// Require `data` on a successful envelope.
pub(crate) fn require<T>(data: Option<T>, what: &str) -> Result<T, Error> {
    data.ok_or_else(|| Error::Deserialization {
        message: format!("{what}: response carried no data"),
        body: String::new(),
    })
}

fn preview(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(BODY_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
