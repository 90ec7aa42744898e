// Feeding plan endpoints
//
// A feeder holds a small fixed number of plans. The cloud assigns the plan
// id on create and echoes the stored plan back on every write.

use secrecy::SecretString;
use tracing::debug;

use crate::client::{FeederClient, require};
use crate::error::Error;
use crate::models::{PlanRecord, PlanWrite};

impl FeederClient {
    /// List the feeding plans stored for a feeder.
    ///
    /// `GET /app/device/feeder/plan/{id}`
    pub async fn list_plans(
        &self,
        token: &SecretString,
        device_id: &str,
    ) -> Result<Vec<PlanRecord>, Error> {
        let data: Option<Vec<PlanRecord>> = self
            .get(&format!("app/device/feeder/plan/{device_id}"), token)
            .await?;
        Ok(data.unwrap_or_default())
    }

    /// Create a plan (`plan_id: None`) or overwrite an existing one.
    ///
    /// `POST /app/device/feeder/plan/{id}`
    pub async fn save_plan(
        &self,
        token: &SecretString,
        device_id: &str,
        plan: &PlanWrite,
    ) -> Result<PlanRecord, Error> {
        debug!(device_id, plan_id = ?plan.plan_id, "saving feeding plan");
        let data = self
            .post(&format!("app/device/feeder/plan/{device_id}"), Some(token), plan)
            .await?;
        require(data, "save plan")
    }

    /// Remove a plan.
    ///
    /// `DELETE /app/device/feeder/plan/{id}/{planId}`
    pub async fn delete_plan(
        &self,
        token: &SecretString,
        device_id: &str,
        plan_id: &str,
    ) -> Result<(), Error> {
        debug!(device_id, plan_id, "deleting feeding plan");
        let _: Option<serde_json::Value> = self
            .delete(&format!("app/device/feeder/plan/{device_id}/{plan_id}"), token)
            .await?;
        Ok(())
    }
}
