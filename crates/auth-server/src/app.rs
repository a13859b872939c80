use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tracing::instrument;

use crate::{
    AppState,
    auth::{
        HandoffCoordinator, HandoffSettings, JwtService, SessionManager, SystemClock, TokenStore,
    },
    config::ServerConfig,
    db::{self, sessions::PgSessionStore, users::PgUserDirectory},
    routes,
};

const TOKEN_SWEEP_PERIOD: Duration = Duration::from_secs(60);

pub struct Server;

impl Server {
    #[instrument(
        name = "auth_server",
        skip(config),
        fields(listen_addr = %config.listen_addr)
    )]
    pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
        let pool = db::create_pool(&config.database_url, config.store_timeout)
            .await
            .context("failed to create postgres pool")?;

        db::migrate(&pool)
            .await
            .context("failed to run database migrations")?;

        let auth_config = config.auth.clone();
        let jwt = Arc::new(
            JwtService::new(auth_config.jwt_secret(), auth_config.jwt_algorithm())
                .context("failed to initialise jwt signer")?,
        );

        let clock = Arc::new(SystemClock);
        let users = Arc::new(PgUserDirectory::new(pool.clone()));
        let session_store = Arc::new(PgSessionStore::new(pool.clone()));

        let tokens = Arc::new(TokenStore::new(auth_config.handshake_ttl(), clock.clone()));
        let _sweeper = tokens.spawn_sweeper(TOKEN_SWEEP_PERIOD);

        let sessions = Arc::new(SessionManager::new(
            session_store,
            users.clone(),
            jwt,
            clock,
            auth_config.session_ttl(),
            config.store_timeout,
        ));

        let handoff = Arc::new(HandoffCoordinator::new(
            tokens,
            users,
            sessions.clone(),
            HandoffSettings {
                bot_username: config.bot.bot_username().to_string(),
                frontend_url: config.bot.frontend_url().to_string(),
                bot_api_key: config.bot.api_key().clone(),
                store_timeout: config.store_timeout,
            },
        ));

        tracing::info!(
            algorithm = %auth_config.jwt_algorithm(),
            session_ttl_hours = auth_config.session_ttl().num_hours(),
            handshake_ttl_minutes = auth_config.handshake_ttl().num_minutes(),
            bot = %config.bot.bot_username(),
            "auth services initialised"
        );

        let state = AppState::new(handoff, sessions);

        let router = routes::router(state);
        let addr: SocketAddr = config
            .listen_addr
            .parse()
            .context("listen address is invalid")?;
        let tcp_listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind tcp listener")?;

        tracing::info!(%addr, "auth server listening");

        let make_service = router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(tcp_listener, make_service)
            .await
            .context("auth server failure")?;

        Ok(())
    }
}
