//! In-memory stores and a wired-up service graph for unit and router tests.

use std::{
    future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration as StdDuration,
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use uuid::Uuid;

use super::{
    bridge::IdentityBridge,
    clock::Clock,
    handoff::{HandoffCoordinator, HandoffSettings},
    jwt::{JwtService, SigningAlgorithm},
    session::{DEFAULT_SESSION_TTL, SessionManager},
    store::{NewSession, SessionStore, StoreError, UserDirectory},
    token_store::{DEFAULT_HANDSHAKE_TTL, ExternalIdentity, HandshakePayload, TokenStore},
};
use crate::db::{
    applications::{LoanApplication, LoanIntake},
    sessions::AuthSession,
    types::ApplicationStatus,
    users::User,
};

pub(crate) const BOT_API_KEY: &str = "test-bot-api-key";
pub(crate) const FRONTEND_URL: &str = "http://localhost:3000";
pub(crate) const BOT_USERNAME: &str = "kreditscore4_bot";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clock that only moves when told to.
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }
}

impl ManualClock {
    pub(crate) fn advance(&self, by: Duration) {
        *lock(&self.now) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Availability {
    Up,
    Refusing,
    Stalled,
}

/// Simulated backend health shared by the in-memory stores.
struct Gate {
    state: Mutex<Availability>,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            state: Mutex::new(Availability::Up),
        }
    }
}

impl Gate {
    fn set(&self, availability: Availability) {
        *lock(&self.state) = availability;
    }

    fn toggle(&self, on: bool, failure: Availability) {
        self.set(if on { failure } else { Availability::Up });
    }

    /// Refusing fails fast. Stalled never resolves, like a hung query.
    async fn pass(&self) -> Result<(), StoreError> {
        let availability = *lock(&self.state);
        match availability {
            Availability::Up => Ok(()),
            Availability::Refusing => Err(StoreError::Unavailable("connection refused".into())),
            Availability::Stalled => future::pending().await,
        }
    }
}

pub(crate) struct MemorySessionStore {
    rows: Mutex<Vec<AuthSession>>,
    clock: Arc<ManualClock>,
    gate: Gate,
    stall_inserts: Mutex<bool>,
}

impl MemorySessionStore {
    pub(crate) fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            clock,
            gate: Gate::default(),
            stall_inserts: Mutex::new(false),
        }
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.gate.toggle(unavailable, Availability::Refusing);
    }

    /// Only `insert` hangs, so credentials can still be validated meanwhile.
    pub(crate) fn set_insert_stalled(&self, stall: bool) {
        *lock(&self.stall_inserts) = stall;
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.rows).len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: NewSession<'_>) -> Result<AuthSession, StoreError> {
        self.gate.pass().await?;
        let stall = *lock(&self.stall_inserts);
        if stall {
            future::pending::<()>().await;
        }
        let mut rows = lock(&self.rows);
        if rows.iter().any(|row| row.token == session.token) {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "duplicate session token".into(),
            )));
        }

        let row = AuthSession {
            id: Uuid::new_v4(),
            token: session.token.to_string(),
            user_id: session.user_id,
            user_agent: session.user_agent.map(str::to_string),
            device_info: session.device_info.map(str::to_string),
            ip_address: session.ip_address.map(str::to_string),
            is_active: true,
            created_at: self.clock.now(),
            expires_at: session.expires_at,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn find_active(&self, token: &str) -> Result<Option<AuthSession>, StoreError> {
        self.gate.pass().await?;
        Ok(lock(&self.rows)
            .iter()
            .find(|row| row.token == token && row.is_active)
            .cloned())
    }

    async fn deactivate(&self, token: &str) -> Result<bool, StoreError> {
        self.gate.pass().await?;
        let mut rows = lock(&self.rows);
        match rows
            .iter_mut()
            .find(|row| row.token == token && row.is_active)
        {
            Some(row) => {
                row.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_active(&self, user_id: Uuid) -> Result<Vec<AuthSession>, StoreError> {
        self.gate.pass().await?;
        let mut active: Vec<_> = lock(&self.rows)
            .iter()
            .filter(|row| row.user_id == user_id && row.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }
}

#[derive(Default)]
struct Directory {
    users: Vec<User>,
    applications: Vec<LoanApplication>,
}

pub(crate) struct MemoryUserDirectory {
    inner: Mutex<Directory>,
    clock: Arc<ManualClock>,
    gate: Gate,
    applications_gate: Gate,
}

impl MemoryUserDirectory {
    pub(crate) fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            inner: Mutex::new(Directory::default()),
            clock,
            gate: Gate::default(),
            applications_gate: Gate::default(),
        }
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.gate.toggle(unavailable, Availability::Refusing);
    }

    /// Hangs application reads and writes only. User lookups keep working so
    /// a bearer credential still validates.
    pub(crate) fn set_applications_stalled(&self, stall: bool) {
        self.applications_gate.toggle(stall, Availability::Stalled);
    }

    pub(crate) fn user_count(&self) -> usize {
        lock(&self.inner).users.len()
    }

    pub(crate) fn applications_for(&self, user_id: Uuid) -> Vec<LoanApplication> {
        lock(&self.inner)
            .applications
            .iter()
            .filter(|application| application.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_or_create(
        &self,
        identity: &ExternalIdentity,
        payload: Option<&HandshakePayload>,
    ) -> Result<User, StoreError> {
        self.gate.pass().await?;
        let now = self.clock.now();
        let mut inner = lock(&self.inner);

        let user = match inner
            .users
            .iter_mut()
            .find(|user| user.telegram_id == identity.telegram_id)
        {
            Some(user) => {
                user.phone_number = Some(identity.phone.clone());
                if identity.first_name.is_some() {
                    user.first_name = identity.first_name.clone();
                }
                if identity.last_name.is_some() {
                    user.last_name = identity.last_name.clone();
                }
                if identity.username.is_some() {
                    user.username = identity.username.clone();
                }
                user.updated_at = now;
                user.clone()
            }
            None => {
                let user = User {
                    id: Uuid::new_v4(),
                    telegram_id: identity.telegram_id,
                    phone_number: Some(identity.phone.clone()),
                    username: identity.username.clone(),
                    first_name: identity.first_name.clone(),
                    last_name: identity.last_name.clone(),
                    created_at: now,
                    updated_at: now,
                };
                inner.users.push(user.clone());
                user
            }
        };

        if let Some(intake) = payload.and_then(LoanIntake::from_payload) {
            inner
                .applications
                .push(pending_application(user.id, intake, now));
        }

        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        self.gate.pass().await?;
        Ok(lock(&self.inner)
            .users
            .iter()
            .find(|user| user.id == user_id)
            .cloned())
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StoreError> {
        self.gate.pass().await?;
        Ok(lock(&self.inner)
            .users
            .iter()
            .find(|user| user.telegram_id == telegram_id)
            .cloned())
    }

    async fn list_applications(&self, user_id: Uuid) -> Result<Vec<LoanApplication>, StoreError> {
        self.gate.pass().await?;
        self.applications_gate.pass().await?;
        let mut applications = self.applications_for(user_id);
        applications.reverse();
        Ok(applications)
    }

    async fn find_application(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<Option<LoanApplication>, StoreError> {
        self.gate.pass().await?;
        self.applications_gate.pass().await?;
        Ok(self
            .applications_for(user_id)
            .into_iter()
            .find(|application| application.id == application_id))
    }

    async fn create_application(
        &self,
        user_id: Uuid,
        intake: &LoanIntake,
    ) -> Result<LoanApplication, StoreError> {
        self.gate.pass().await?;
        self.applications_gate.pass().await?;
        let now = self.clock.now();
        let application = pending_application(user_id, intake.clone(), now);
        lock(&self.inner).applications.push(application.clone());
        Ok(application)
    }
}

fn pending_application(user_id: Uuid, intake: LoanIntake, now: DateTime<Utc>) -> LoanApplication {
    LoanApplication {
        id: Uuid::new_v4(),
        user_id,
        loan_amount: intake.loan_amount,
        loan_term: intake.loan_term,
        loan_purpose: intake.loan_purpose,
        monthly_income: intake.monthly_income,
        status: ApplicationStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn identity(telegram_id: i64) -> ExternalIdentity {
    ExternalIdentity {
        telegram_id,
        phone: format!("+7999{telegram_id:07}"),
        first_name: Some("Ivan".into()),
        last_name: Some("Petrov".into()),
        username: Some(format!("user{telegram_id}")),
    }
}

fn secret(byte: u8) -> SecretString {
    SecretString::new(STANDARD.encode([byte; 32]).into())
}

pub(crate) struct Fixture {
    pub clock: Arc<ManualClock>,
    pub tokens: Arc<TokenStore>,
    pub users: Arc<MemoryUserDirectory>,
    pub session_store: Arc<MemorySessionStore>,
    pub jwt: Arc<JwtService>,
    pub sessions: Arc<SessionManager>,
    pub handoff: Arc<HandoffCoordinator>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let tokens = Arc::new(TokenStore::new(DEFAULT_HANDSHAKE_TTL, clock.clone()));
        let users = Arc::new(MemoryUserDirectory::new(clock.clone()));
        let session_store = Arc::new(MemorySessionStore::new(clock.clone()));
        let jwt = Arc::new(
            JwtService::new(&secret(9), SigningAlgorithm::Hs256).expect("test secret is valid"),
        );

        let sessions = Arc::new(SessionManager::new(
            session_store.clone(),
            users.clone(),
            jwt.clone(),
            clock.clone(),
            DEFAULT_SESSION_TTL,
            StdDuration::from_secs(1),
        ));

        let handoff = Arc::new(HandoffCoordinator::new(
            tokens.clone(),
            users.clone(),
            sessions.clone(),
            HandoffSettings {
                bot_username: BOT_USERNAME.into(),
                frontend_url: FRONTEND_URL.into(),
                bot_api_key: SecretString::new(BOT_API_KEY.into()),
                store_timeout: StdDuration::from_secs(1),
            },
        ));

        Self {
            clock,
            tokens,
            users,
            session_store,
            jwt,
            sessions,
            handoff,
        }
    }

    pub(crate) fn bridge(&self) -> IdentityBridge {
        IdentityBridge::new(
            self.tokens.clone(),
            self.users.clone(),
            FRONTEND_URL,
            StdDuration::from_secs(1),
        )
    }

    /// A signer with a different key, for forging credentials.
    pub(crate) fn foreign_jwt() -> JwtService {
        JwtService::new(&secret(10), SigningAlgorithm::Hs256).expect("test secret is valid")
    }
}
