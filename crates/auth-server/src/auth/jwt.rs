use std::{collections::HashSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const DEFAULT_JWT_LEEWAY_SECONDS: u64 = 60;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid jwt secret")]
    InvalidSecret,
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// HMAC family accepted for session credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningAlgorithm {
    #[default]
    Hs256,
    Hs384,
    Hs512,
}

impl SigningAlgorithm {
    fn algorithm(self) -> Algorithm {
        match self {
            Self::Hs256 => Algorithm::HS256,
            Self::Hs384 => Algorithm::HS384,
            Self::Hs512 => Algorithm::HS512,
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = ();

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_uppercase().as_str() {
            "HS256" => Ok(Self::Hs256),
            "HS384" => Ok(Self::Hs384),
            "HS512" => Ok(Self::Hs512),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub telegram_id: i64,
    pub iat: i64,
    pub exp: i64,
    /// Keeps credentials unique when one user signs in twice within a second.
    pub jti: Uuid,
}

impl SessionClaims {
    pub fn new(
        user_id: Uuid,
        telegram_id: i64,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: user_id,
            telegram_id,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        }
    }
}

#[derive(Clone)]
pub struct JwtService {
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    /// `secret` is base64 encoded, as validated by the config layer.
    pub fn new(secret: &SecretString, algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        let encoding_key = EncodingKey::from_base64_secret(secret.expose_secret())
            .map_err(|_| JwtError::InvalidSecret)?;
        let decoding_key = DecodingKey::from_base64_secret(secret.expose_secret())
            .map_err(|_| JwtError::InvalidSecret)?;

        Ok(Self {
            algorithm,
            encoding_key,
            decoding_key,
        })
    }

    pub fn encode_session(&self, claims: &SessionClaims) -> Result<String, JwtError> {
        Ok(encode(
            &Header::new(self.algorithm.algorithm()),
            claims,
            &self.encoding_key,
        )?)
    }

    pub fn decode_session(&self, token: &str) -> Result<SessionClaims, JwtError> {
        self.decode_session_with_leeway(token, DEFAULT_JWT_LEEWAY_SECONDS)
    }

    fn decode_session_with_leeway(
        &self,
        token: &str,
        leeway_seconds: u64,
    ) -> Result<SessionClaims, JwtError> {
        if token.trim().is_empty() {
            return Err(JwtError::InvalidToken);
        }

        let mut validation = Validation::new(self.algorithm.algorithm());
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["sub".to_string(), "exp".to_string()]);
        validation.leeway = leeway_seconds;

        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(error) => Err(match error.kind() {
                ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                _ => JwtError::InvalidToken,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use chrono::Duration;

    use super::*;

    fn secret(byte: u8) -> SecretString {
        SecretString::new(STANDARD.encode([byte; 32]).into())
    }

    fn claims(issued_at: DateTime<Utc>, ttl: Duration) -> SessionClaims {
        SessionClaims::new(Uuid::new_v4(), 42, issued_at, issued_at + ttl)
    }

    #[test]
    fn encodes_and_decodes_claims() {
        let jwt = JwtService::new(&secret(7), SigningAlgorithm::Hs256).unwrap();
        let claims = claims(Utc::now(), Duration::days(7));

        let token = jwt.encode_session(&claims).unwrap();
        assert_eq!(jwt.decode_session(&token).unwrap(), claims);
    }

    #[test]
    fn rejects_foreign_signature() {
        let ours = JwtService::new(&secret(1), SigningAlgorithm::Hs256).unwrap();
        let theirs = JwtService::new(&secret(2), SigningAlgorithm::Hs256).unwrap();

        let token = theirs
            .encode_session(&claims(Utc::now(), Duration::days(7)))
            .unwrap();
        assert!(matches!(
            ours.decode_session(&token),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let jwt = JwtService::new(&secret(3), SigningAlgorithm::Hs256).unwrap();
        let issued_at = Utc::now() - Duration::days(8);
        let token = jwt
            .encode_session(&claims(issued_at, Duration::days(7)))
            .unwrap();

        assert!(matches!(
            jwt.decode_session(&token),
            Err(JwtError::TokenExpired)
        ));
    }

    #[test]
    fn rejects_garbage_and_wrong_algorithm() {
        let hs256 = JwtService::new(&secret(4), SigningAlgorithm::Hs256).unwrap();
        let hs512 = JwtService::new(&secret(4), SigningAlgorithm::Hs512).unwrap();

        assert!(matches!(
            hs256.decode_session("not-a-jwt"),
            Err(JwtError::InvalidToken)
        ));
        assert!(matches!(hs256.decode_session("  "), Err(JwtError::InvalidToken)));

        let token = hs512
            .encode_session(&claims(Utc::now(), Duration::days(1)))
            .unwrap();
        assert!(matches!(
            hs256.decode_session(&token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn rejects_invalid_secret() {
        let bad = SecretString::new("%%% not base64 %%%".to_string().into());
        assert!(matches!(
            JwtService::new(&bad, SigningAlgorithm::Hs256),
            Err(JwtError::InvalidSecret)
        ));
    }

    #[test]
    fn parses_algorithm_names() {
        assert_eq!("hs384".parse(), Ok(SigningAlgorithm::Hs384));
        assert_eq!("HS512".parse(), Ok(SigningAlgorithm::Hs512));
        assert!("RS256".parse::<SigningAlgorithm>().is_err());
        assert_eq!(SigningAlgorithm::default().to_string(), "HS256");
    }
}
