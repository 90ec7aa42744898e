// Wire types for the HGSmart cloud API
//
// Every response is wrapped in `{ "code": 200, "msg": "...", "data": ... }`.
// Field names are the vendor's camelCase; a few fields arrive as either a
// number or a string depending on firmware, hence the lenient deserializers.

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

/// Envelope `code` that marks success.
pub const CODE_OK: i64 = 200;
/// Envelope `code` the cloud uses for an expired or revoked access token.
pub const CODE_TOKEN_EXPIRED: i64 = 401;

/// The `{code, msg, data}` envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

// ── Auth ────────────────────────────────────────────────────────────

/// Login request body for `POST /oauth/login`.
#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub account_num: &'a str,
    pub pwd: &'a str,
    pub captcha_uuid: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// Refresh request body for `POST /oauth/refreshToken`.
#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refreshtoken: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawTokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Token pair issued by login or refresh.
///
/// `expires_in` is seconds from issue; the cloud usually omits it.
#[derive(Debug)]
pub struct TokenGrant {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_in: Option<i64>,
}

impl From<RawTokenGrant> for TokenGrant {
    fn from(raw: RawTokenGrant) -> Self {
        Self {
            access_token: SecretString::from(raw.access_token),
            refresh_token: SecretString::from(raw.refresh_token),
            expires_in: raw.expires_in,
        }
    }
}

// ── Devices ─────────────────────────────────────────────────────────

/// One entry of `GET /app/device/list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    /// Hardware model, e.g. `S25D`.
    #[serde(rename = "type", default)]
    pub model: String,
    #[serde(default)]
    pub fw_version: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub online: bool,
}

/// `GET /app/device/feeder/summary/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeederSummary {
    /// Food remaining, percent of hopper capacity.
    #[serde(default)]
    pub remaining: Option<i64>,
    /// Days until the desiccant pack should be replaced.
    #[serde(default)]
    pub desiccant_expire: Option<i64>,
}

// ── Schedules ───────────────────────────────────────────────────────

/// A feeding plan as stored by the cloud. Hour and minute are UTC.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub plan_id: String,
    pub hour: u8,
    pub minute: u8,
    pub portions: u8,
    #[serde(default, deserialize_with = "flag")]
    pub enable: bool,
    #[serde(default = "every_day")]
    pub week_mask: u8,
}

/// Create-or-update body for a feeding plan. `plan_id: None` creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    pub hour: u8,
    pub minute: u8,
    pub portions: u8,
    pub enable: bool,
    pub week_mask: u8,
}

fn every_day() -> u8 {
    0x7f
}

// ── Lenient field decoders ──────────────────────────────────────────

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => b,
        Raw::Number(n) => n != 0,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_without_data_has_none() {
        let envelope: Envelope<DeviceRecord> =
            serde_json::from_value(json!({ "code": 200, "msg": "success" })).unwrap();
        assert_eq!(envelope.code, CODE_OK);
        assert!(envelope.data.is_none());

        let envelope: Envelope<Vec<DeviceRecord>> =
            serde_json::from_value(json!({ "code": 200, "data": null })).unwrap();
        assert!(envelope.data.is_none());
        assert!(envelope.msg.is_none());
    }

    #[test]
    fn device_record_accepts_numeric_ids_and_int_flags() {
        let record: DeviceRecord = serde_json::from_value(json!({
            "deviceId": 12345,
            "name": "Kitchen",
            "type": "S25D",
            "fwVersion": "1.0.7",
            "online": 1
        }))
        .unwrap();

        assert_eq!(record.device_id, "12345");
        assert_eq!(record.model, "S25D");
        assert!(record.online);
    }

    #[test]
    fn plan_record_defaults_to_every_day() {
        let plan: PlanRecord = serde_json::from_value(json!({
            "planId": "p1",
            "hour": 7,
            "minute": 30,
            "portions": 2,
            "enable": true
        }))
        .unwrap();

        assert_eq!(plan.week_mask, 0x7f);
        assert_eq!(plan.plan_id, "p1");
    }

    #[test]
    fn plan_write_omits_missing_id() {
        let body = serde_json::to_value(PlanWrite {
            plan_id: None,
            hour: 6,
            minute: 0,
            portions: 1,
            enable: true,
            week_mask: 0x1f,
        })
        .unwrap();

        assert!(body.get("planId").is_none());
        assert_eq!(body["weekMask"], 0x1f);
    }
}
