// Token endpoints
//
// Password login and refresh-token rotation. Both calls are made with the
// app identity in the body; neither keeps any state on the client.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::client::{FeederClient, require};
use crate::error::Error;
use crate::models::{LoginRequest, RawTokenGrant, RefreshRequest, TokenGrant};

impl FeederClient {
    /// Exchange account credentials for a token pair.
    ///
    /// `POST /oauth/login`
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<TokenGrant, Error> {
        debug!(username, "logging in");
        let app = self.app();
        let body = LoginRequest {
            account_num: username,
            pwd: password.expose_secret(),
            captcha_uuid: "",
            client_id: &app.client_id,
            client_secret: app.client_secret.expose_secret(),
        };
        let data: Option<RawTokenGrant> = self.post("oauth/login", None, &body).await?;
        Ok(require(data, "login")?.into())
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// The cloud rotates refresh tokens: the one passed in is dead once this
    /// returns `Ok`. `access_token` may be `None` when resuming a persisted
    /// session that never held one.
    ///
    /// `POST /oauth/refreshToken`
    pub async fn refresh(
        &self,
        access_token: Option<&SecretString>,
        refresh_token: &SecretString,
    ) -> Result<TokenGrant, Error> {
        debug!("refreshing access token");
        let body = RefreshRequest {
            refreshtoken: refresh_token.expose_secret(),
        };
        let data: Option<RawTokenGrant> = self.post("oauth/refreshToken", access_token, &body).await?;
        Ok(require(data, "refresh")?.into())
    }
}
