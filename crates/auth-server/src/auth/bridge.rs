use std::{sync::Arc, time::Duration};

use super::{
    handoff::HandoffError,
    store::{UserDirectory, with_deadline},
    token_store::{ExternalIdentity, TokenStore},
};
use crate::db::users::User;

/// Result of a completed bot handshake, handed back to the bot.
#[derive(Debug, Clone)]
pub struct SessionBootstrap {
    pub token: String,
    pub user: User,
    pub return_url: String,
}

/// Binds identities verified by the bot to pending handshakes.
pub struct IdentityBridge {
    tokens: Arc<TokenStore>,
    users: Arc<dyn UserDirectory>,
    frontend_url: String,
    store_timeout: Duration,
}

impl IdentityBridge {
    pub fn new(
        tokens: Arc<TokenStore>,
        users: Arc<dyn UserDirectory>,
        frontend_url: &str,
        store_timeout: Duration,
    ) -> Self {
        Self {
            tokens,
            users,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            store_timeout,
        }
    }

    /// Resolves the durable user and binds the identity to `token`.
    ///
    /// The token is checked before the user store is touched so an expired
    /// handshake never creates users or applications. The user upsert is
    /// idempotent, so a token that expires between the check and the bind only
    /// costs a harmless profile refresh.
    pub async fn complete_handshake(
        &self,
        token: &str,
        identity: ExternalIdentity,
    ) -> Result<SessionBootstrap, HandoffError> {
        let payload = self.tokens.peek_payload(token)?;

        let user = with_deadline(
            self.store_timeout,
            self.users.find_or_create(&identity, payload.as_ref()),
        )
        .await?;

        self.tokens.bind_identity(token, identity)?;

        tracing::info!(
            user_id = %user.id,
            telegram_id = user.telegram_id,
            "handshake confirmed by bot"
        );

        Ok(SessionBootstrap {
            token: token.to_string(),
            return_url: self.return_url(token),
            user,
        })
    }

    fn return_url(&self, token: &str) -> String {
        format!("{}/?auth_token={}", self.frontend_url, token)
    }
}
