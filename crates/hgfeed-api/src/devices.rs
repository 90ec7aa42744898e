// Device endpoints
//
// Account device list, feeder summary, and the feeder commands the cloud
// exposes: manual feed, desiccant reset, and hopper refill level.

use chrono::{Timelike, Utc};
use secrecy::SecretString;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::client::{FeederClient, require};
use crate::error::Error;
use crate::models::{DeviceRecord, FeederSummary};

/// Hopper capacity the cloud's refill endpoint is scaled to.
pub const REFILL_CAPACITY: u16 = 200;

impl FeederClient {
    /// List every device on the account.
    ///
    /// `GET /app/device/list`
    pub async fn list_devices(&self, token: &SecretString) -> Result<Vec<DeviceRecord>, Error> {
        debug!("listing devices");
        let data: Option<Vec<DeviceRecord>> = self.get("app/device/list", token).await?;
        Ok(data.unwrap_or_default())
    }

    /// Food level and desiccant countdown for one feeder.
    ///
    /// `GET /app/device/feeder/summary/{id}`
    pub async fn feeder_summary(
        &self,
        token: &SecretString,
        device_id: &str,
    ) -> Result<FeederSummary, Error> {
        let data = self
            .get(&format!("app/device/feeder/summary/{device_id}"), token)
            .await?;
        require(data, "feeder summary")
    }

    /// Dispense `portions` right now.
    ///
    /// `PUT /app/device/attribute/{id}` with a multipart `command` field.
    pub async fn manual_feed(
        &self,
        token: &SecretString,
        device_id: &str,
        portions: u8,
    ) -> Result<(), Error> {
        debug!(device_id, portions, "sending manual feed");
        let now = Utc::now();
        let command = feed_command(
            portions,
            now.minute(),
            now.timestamp_millis(),
            &Uuid::new_v4().simple().to_string(),
        );
        let part = reqwest::multipart::Part::text(command).mime_str("application/json")?;
        let form = reqwest::multipart::Form::new().part("command", part);
        let _: Option<serde_json::Value> = self
            .put_form(&format!("app/device/attribute/{device_id}"), token, form)
            .await?;
        Ok(())
    }

    /// Mark the desiccant pack as replaced.
    ///
    /// `PUT /app/device/feeder/desiccant/{id}`
    pub async fn reset_desiccant(&self, token: &SecretString, device_id: &str) -> Result<(), Error> {
        debug!(device_id, "resetting desiccant");
        let _: Option<serde_json::Value> = self
            .put(&format!("app/device/feeder/desiccant/{device_id}"), token, None)
            .await?;
        Ok(())
    }

    /// Tell the cloud how full the hopper is, in percent.
    ///
    /// `PUT /app/device/feeder/refill`
    pub async fn set_food_remaining(
        &self,
        token: &SecretString,
        device_id: &str,
        percent: u8,
    ) -> Result<(), Error> {
        debug!(device_id, percent, "setting food remaining");
        let body = json!({
            "deviceId": device_id,
            "capacity": REFILL_CAPACITY,
            "surplus": refill_surplus(percent),
            "capacityModel": "",
        });
        let _: Option<serde_json::Value> = self
            .put("app/device/feeder/refill", token, Some(&body))
            .await?;
        Ok(())
    }
}

/// Convert a percentage into the refill endpoint's capacity units.
pub fn refill_surplus(percent: u8) -> u16 {
    u16::from(percent.min(100)) * REFILL_CAPACITY / 100
}

/// The `userfoodframe` control frame: `01 20 <minute> <portions>` in hex.
pub fn feed_command(portions: u8, minute: u32, ctrl_time_ms: i64, message_id: &str) -> String {
    json!({
        "ctrl": {
            "identifier": "userfoodframe",
            "value": format!("0120{minute:02x}{portions:02x}"),
        },
        "ctrl_time": ctrl_time_ms.to_string(),
        "message_id": message_id,
    })
    .to_string()
}
