// Shared transport configuration for building the reqwest::Client.
//
// The HGSmart cloud expects the headers of its mobile app on every call
// (locale, time zone, unit system). They are installed once as default
// headers so the endpoint modules only deal with auth and bodies.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue};

use crate::error::Error;

/// User agent of the vendor's mobile app. The cloud rejects unknown agents.
pub const APP_USER_AGENT: &str = "Dart/3.6 (dart:io)";

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (debugging proxies only).
    DangerAcceptInvalid,
}

/// Transport settings shared by every request.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
    /// Sent as `Accept-Language`.
    pub locale: String,
    /// Sent as `Zoneid`.
    pub timezone: String,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(10),
            locale: "it-IT".into(),
            timezone: "Europe/Rome".into(),
            user_agent: APP_USER_AGENT.into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .default_headers(self.default_headers()?);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    fn default_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, header_value("Accept-Language", &self.locale)?);
        headers.insert(
            HeaderName::from_static("zoneid"),
            header_value("Zoneid", &self.timezone)?,
        );
        // Metric units for weight and temperature.
        headers.insert(HeaderName::from_static("wunit"), HeaderValue::from_static("0"));
        headers.insert(HeaderName::from_static("tunit"), HeaderValue::from_static("0"));
        Ok(headers)
    }
}

pub(crate) fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader {
        name,
        value: value.to_owned(),
    })
}
