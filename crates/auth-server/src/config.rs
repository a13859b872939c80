use std::{env, str::FromStr, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use secrecy::SecretString;
use thiserror::Error;

use crate::auth::{DEFAULT_STORE_TIMEOUT, SigningAlgorithm};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub listen_addr: String,
    pub store_timeout: Duration,
    pub sentry_dsn: Option<String>,
    pub auth: AuthConfig,
    pub bot: BotConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` is not set")]
    MissingVar(&'static str),
    #[error("invalid value for environment variable `{0}`")]
    InvalidVar(&'static str),
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("SERVER_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .ok_or(ConfigError::MissingVar("DATABASE_URL"))?;

        let listen_addr =
            lookup("SERVER_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string());

        let store_timeout_secs: u64 = parse_or(
            &lookup,
            "STORE_TIMEOUT_SECS",
            DEFAULT_STORE_TIMEOUT.as_secs(),
        )?;
        if store_timeout_secs == 0 {
            return Err(ConfigError::InvalidVar("STORE_TIMEOUT_SECS"));
        }

        let sentry_dsn = lookup("SENTRY_DSN").filter(|dsn| !dsn.trim().is_empty());

        let auth = AuthConfig::from_lookup(&lookup)?;
        let bot = BotConfig::from_lookup(&lookup)?;

        Ok(Self {
            database_url,
            listen_addr,
            store_timeout: Duration::from_secs(store_timeout_secs),
            sentry_dsn,
            auth,
            bot,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    jwt_secret: SecretString,
    jwt_algorithm: SigningAlgorithm,
    session_ttl: chrono::Duration,
    handshake_ttl: chrono::Duration,
}

impl AuthConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::MissingVar("JWT_SECRET"))?;
        validate_jwt_secret(&jwt_secret)?;
        let jwt_secret = SecretString::new(jwt_secret.into());

        let jwt_algorithm = match lookup("JWT_ALGORITHM") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidVar("JWT_ALGORITHM"))?,
            None => SigningAlgorithm::default(),
        };

        let session_ttl_hours: i64 = parse_or(lookup, "SESSION_TTL_HOURS", 168)?;
        if session_ttl_hours <= 0 {
            return Err(ConfigError::InvalidVar("SESSION_TTL_HOURS"));
        }

        let handshake_ttl_minutes: i64 = parse_or(lookup, "HANDSHAKE_TTL_MINUTES", 10)?;
        if handshake_ttl_minutes <= 0 {
            return Err(ConfigError::InvalidVar("HANDSHAKE_TTL_MINUTES"));
        }

        Ok(Self {
            jwt_secret,
            jwt_algorithm,
            session_ttl: chrono::Duration::hours(session_ttl_hours),
            handshake_ttl: chrono::Duration::minutes(handshake_ttl_minutes),
        })
    }

    pub fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    pub fn jwt_algorithm(&self) -> SigningAlgorithm {
        self.jwt_algorithm
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        self.session_ttl
    }

    pub fn handshake_ttl(&self) -> chrono::Duration {
        self.handshake_ttl
    }
}

/// Settings shared with the Telegram bot process.
#[derive(Debug, Clone)]
pub struct BotConfig {
    api_key: SecretString,
    bot_username: String,
    frontend_url: String,
}

impl BotConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("BOT_API_KEY")
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingVar("BOT_API_KEY"))?;

        let bot_username = lookup("TELEGRAM_BOT_USERNAME")
            .map(|name| name.trim_start_matches('@').to_string())
            .unwrap_or_else(|| "kreditscore4_bot".to_string());

        let frontend_url =
            lookup("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            api_key: SecretString::new(api_key.into()),
            bot_username,
            frontend_url,
        })
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn bot_username(&self) -> &str {
        &self.bot_username
    }

    pub fn frontend_url(&self) -> &str {
        &self.frontend_url
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidVar(key)),
        None => Ok(default),
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ConfigError> {
    let decoded = BASE64_STANDARD
        .decode(secret.as_bytes())
        .map_err(|_| ConfigError::InvalidVar("JWT_SECRET"))?;

    if decoded.len() < 32 {
        return Err(ConfigError::InvalidVar("JWT_SECRET"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn base_vars() -> HashMap<&'static str, String> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/auth".to_string()),
            ("JWT_SECRET", BASE64_STANDARD.encode([5u8; 32])),
            ("BOT_API_KEY", "bot-secret".to_string()),
        ])
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<ServerConfig, ConfigError> {
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn applies_defaults() {
        let config = load(&base_vars()).unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:8000");
        assert_eq!(config.store_timeout, DEFAULT_STORE_TIMEOUT);
        assert_eq!(config.sentry_dsn, None);
        assert_eq!(config.auth.jwt_algorithm(), SigningAlgorithm::Hs256);
        assert_eq!(config.auth.session_ttl(), chrono::Duration::hours(168));
        assert_eq!(config.auth.handshake_ttl(), chrono::Duration::minutes(10));
        assert_eq!(config.bot.bot_username(), "kreditscore4_bot");
        assert_eq!(config.bot.frontend_url(), "http://localhost:3000");
        assert_eq!(config.bot.api_key().expose_secret(), "bot-secret");
    }

    #[test]
    fn server_database_url_takes_precedence() {
        let mut vars = base_vars();
        vars.insert("SERVER_DATABASE_URL", "postgres://primary/auth".into());
        assert_eq!(load(&vars).unwrap().database_url, "postgres://primary/auth");
    }

    #[test]
    fn reads_overrides() {
        let mut vars = base_vars();
        vars.insert("JWT_ALGORITHM", "hs512".into());
        vars.insert("SESSION_TTL_HOURS", "24".into());
        vars.insert("HANDSHAKE_TTL_MINUTES", "3".into());
        vars.insert("TELEGRAM_BOT_USERNAME", "@other_bot".into());

        let config = load(&vars).unwrap();
        assert_eq!(config.auth.jwt_algorithm(), SigningAlgorithm::Hs512);
        assert_eq!(config.auth.session_ttl(), chrono::Duration::hours(24));
        assert_eq!(config.auth.handshake_ttl(), chrono::Duration::minutes(3));
        assert_eq!(config.bot.bot_username(), "other_bot");
    }

    #[test]
    fn missing_required_vars_fail() {
        for key in ["DATABASE_URL", "JWT_SECRET", "BOT_API_KEY"] {
            let mut vars = base_vars();
            vars.remove(key);
            assert!(
                matches!(load(&vars), Err(ConfigError::MissingVar(_))),
                "{key} should be required"
            );
        }
    }

    #[test]
    fn rejects_short_or_non_base64_secret() {
        let mut vars = base_vars();
        vars.insert("JWT_SECRET", BASE64_STANDARD.encode([1u8; 16]));
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidVar("JWT_SECRET"))
        ));

        vars.insert("JWT_SECRET", "not base64!".into());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidVar("JWT_SECRET"))
        ));
    }

    #[test]
    fn rejects_bad_numbers_and_algorithms() {
        let mut vars = base_vars();
        vars.insert("SESSION_TTL_HOURS", "0".into());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidVar("SESSION_TTL_HOURS"))
        ));

        let mut vars = base_vars();
        vars.insert("STORE_TIMEOUT_SECS", "soon".into());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidVar("STORE_TIMEOUT_SECS"))
        ));

        let mut vars = base_vars();
        vars.insert("JWT_ALGORITHM", "RS256".into());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidVar("JWT_ALGORITHM"))
        ));
    }
}
