use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use utils::device::DeviceInfo;
use uuid::Uuid;

use super::{
    bridge::{IdentityBridge, SessionBootstrap},
    session::{SessionError, SessionManager, SessionMetadata},
    store::{StoreError, UserDirectory, with_deadline},
    token_store::{
        ConsumedHandshake, ExternalIdentity, HandshakePayload, TokenError, TokenStore,
    },
};
use crate::db::{
    applications::{LoanApplication, LoanIntake},
    sessions::AuthSession,
    users::User,
};

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("bot credential rejected")]
    UnauthorizedBridge,
    #[error("no user with telegram id {0}")]
    UserNotFound(i64),
    #[error("durable store unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error(transparent)]
    Store(StoreError),
}

impl HandoffError {
    /// Only upstream outages are worth retrying. Token errors always mean the
    /// handshake has to be restarted.
    pub fn is_retryable(&self) -> bool {
        match self {
            HandoffError::UpstreamUnavailable(_) => true,
            HandoffError::Session(error) => error.is_retryable(),
            _ => false,
        }
    }
}

impl From<StoreError> for HandoffError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(reason) => HandoffError::UpstreamUnavailable(reason),
            other => HandoffError::Store(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandoffSettings {
    pub bot_username: String,
    pub frontend_url: String,
    pub bot_api_key: SecretString,
    pub store_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HandshakeInit {
    pub token: String,
    /// Deep link that opens the bot with the token as its start parameter.
    pub external_channel_target: String,
    pub expires_at: DateTime<Utc>,
}

/// Browser-side request details captured when the token is exchanged.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    pub credential: String,
    pub user: User,
    pub session: AuthSession,
    pub device_info: DeviceInfo,
}

/// Drives the browser → bot → browser login flow.
pub struct HandoffCoordinator {
    tokens: Arc<TokenStore>,
    bridge: IdentityBridge,
    sessions: Arc<SessionManager>,
    users: Arc<dyn UserDirectory>,
    bot_username: String,
    bot_key_digest: [u8; 32],
    store_timeout: Duration,
}

impl HandoffCoordinator {
    pub fn new(
        tokens: Arc<TokenStore>,
        users: Arc<dyn UserDirectory>,
        sessions: Arc<SessionManager>,
        settings: HandoffSettings,
    ) -> Self {
        let bridge = IdentityBridge::new(
            tokens.clone(),
            users.clone(),
            &settings.frontend_url,
            settings.store_timeout,
        );

        Self {
            tokens,
            bridge,
            sessions,
            users,
            bot_username: settings.bot_username,
            bot_key_digest: digest(settings.bot_api_key.expose_secret()),
            store_timeout: settings.store_timeout,
        }
    }

    pub fn request_handshake(&self, payload: Option<HandshakePayload>) -> HandshakeInit {
        let ticket = self.tokens.issue(payload);
        tracing::debug!(expires_at = %ticket.expires_at, "issued handshake token");

        HandshakeInit {
            external_channel_target: format!(
                "https://t.me/{}?start={}",
                self.bot_username, ticket.token
            ),
            token: ticket.token,
            expires_at: ticket.expires_at,
        }
    }

    /// Checks the credential presented by the bot. Both sides are hashed first so
    /// the comparison runs in constant time regardless of length.
    pub fn authorize_bridge(&self, presented: Option<&str>) -> Result<(), HandoffError> {
        let Some(presented) = presented else {
            return Err(HandoffError::UnauthorizedBridge);
        };

        if bool::from(digest(presented).ct_eq(&self.bot_key_digest)) {
            Ok(())
        } else {
            tracing::warn!("rejected bot request with invalid api key");
            Err(HandoffError::UnauthorizedBridge)
        }
    }

    pub async fn complete_from_external_channel(
        &self,
        token: &str,
        identity: ExternalIdentity,
    ) -> Result<SessionBootstrap, HandoffError> {
        self.bridge.complete_handshake(token, identity).await
    }

    /// Trades a bot-confirmed handshake token for a session credential.
    ///
    /// The token is consumed up front so that concurrent exchanges cannot both
    /// win. If anything after that fails, or the request is dropped midway, the
    /// token is put back and the browser can retry.
    pub async fn exchange_token(
        &self,
        token: &str,
        context: RequestContext,
    ) -> Result<ExchangeOutcome, HandoffError> {
        let consumed = self.tokens.consume(token)?;
        let telegram_id = consumed.identity.telegram_id;
        let guard = RestoreOnDrop::new(&self.tokens, token, consumed);

        let user = with_deadline(self.store_timeout, self.users.find_by_telegram_id(telegram_id))
            .await?
            .ok_or(HandoffError::UserNotFound(telegram_id))?;

        let device_info = DeviceInfo::from_user_agent(context.user_agent.as_deref().unwrap_or(""));
        let metadata = SessionMetadata {
            ip_address: context.ip_address,
            user_agent: context.user_agent,
            device_info: Some(device_info.to_json_string()),
        };

        let issued = self.sessions.issue_session(&user, &metadata).await?;
        guard.disarm();

        tracing::info!(
            user_id = %user.id,
            session_id = %issued.session.id,
            "handshake exchanged for session"
        );

        Ok(ExchangeOutcome {
            credential: issued.credential,
            user,
            session: issued.session,
            device_info,
        })
    }

    pub async fn logout(&self, credential: &str) -> Result<(), HandoffError> {
        Ok(self.sessions.revoke_session(credential).await?)
    }

    /// Profile and loan applications for a telegram account, as shown to the bot.
    pub async fn lookup_telegram_user(
        &self,
        telegram_id: i64,
    ) -> Result<(User, Vec<LoanApplication>), HandoffError> {
        let user = with_deadline(self.store_timeout, self.users.find_by_telegram_id(telegram_id))
            .await?
            .ok_or(HandoffError::UserNotFound(telegram_id))?;
        let applications =
            with_deadline(self.store_timeout, self.users.list_applications(user.id)).await?;
        Ok((user, applications))
    }

    /// Applications owned by a signed-in user, newest first.
    pub async fn list_applications(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<LoanApplication>, HandoffError> {
        Ok(with_deadline(self.store_timeout, self.users.list_applications(user_id)).await?)
    }

    pub async fn find_application(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<Option<LoanApplication>, HandoffError> {
        Ok(with_deadline(
            self.store_timeout,
            self.users.find_application(user_id, application_id),
        )
        .await?)
    }

    /// Files a new pending application. `intake` must already be validated.
    pub async fn submit_application(
        &self,
        user_id: Uuid,
        intake: &LoanIntake,
    ) -> Result<LoanApplication, HandoffError> {
        let application = with_deadline(
            self.store_timeout,
            self.users.create_application(user_id, intake),
        )
        .await?;
        tracing::info!(
            user_id = %user_id,
            application_id = %application.id,
            "loan application submitted"
        );
        Ok(application)
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// Puts a consumed handshake back into the store unless disarmed.
struct RestoreOnDrop<'a> {
    tokens: &'a TokenStore,
    token: &'a str,
    consumed: Option<ConsumedHandshake>,
}

impl<'a> RestoreOnDrop<'a> {
    fn new(tokens: &'a TokenStore, token: &'a str, consumed: ConsumedHandshake) -> Self {
        Self {
            tokens,
            token,
            consumed: Some(consumed),
        }
    }

    fn disarm(mut self) {
        self.consumed = None;
    }
}

impl Drop for RestoreOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(consumed) = self.consumed.take() {
            tracing::warn!("token exchange did not complete, restoring handshake");
            self.tokens.restore(self.token, consumed);
        }
    }
}
