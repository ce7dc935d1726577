//! Credential checks and role gating for mutation endpoints.
//!
//! Tokens carry the account id as their subject; every authenticated request
//! re-resolves the account so a deleted or demoted user loses access the
//! moment the record changes, not when the token expires.

use std::fmt;
use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use bcrypt::BcryptError;
use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::ports::domain::{Role, User, UserId};
use crate::ports::repository::{Datastore, RepositoryError};

pub fn hash_password(password: &str) -> Result<String, BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, BcryptError> {
    bcrypt::verify(password, hash)
}

/// Token payload. `sub` is the account id, not the username.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
}

/// Successful login response body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginGrant {
    pub access_token: String,
    pub role: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("missing or invalid token")]
    InvalidToken,
    #[error("access denied")]
    Forbidden,
    #[error("password check failed: {0}")]
    Hash(#[from] BcryptError),
    #[error("token issuance failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Role gate in front of the admin-only routes.
pub struct AuthGate<D> {
    store: Arc<D>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl_secs: u64,
}

impl<D> fmt::Debug for AuthGate<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate").finish_non_exhaustive()
    }
}

impl<D: Datastore> AuthGate<D> {
    pub fn new(store: Arc<D>, config: &AuthConfig) -> Self {
        Self {
            store,
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_ttl_secs: config.token_ttl_secs,
        }
    }

    /// Verifies credentials and issues an access token. Unknown usernames
    /// and wrong passwords are indistinguishable to the caller.
    pub fn login(&self, username: &str, password: &str) -> Result<LoginGrant, AuthError> {
        let Some(user) = self.store.fetch_user_by_username(username)? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self.issue_token(&user)?;
        Ok(LoginGrant {
            access_token,
            role: user.role.label(),
        })
    }

    fn issue_token(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: user.id.to_string(),
            exp: get_current_timestamp() + self.token_ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Resolves the bearer token to a stored account. A well-formed token
    /// whose account no longer exists is a forbidden request, not a retry.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<User, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::InvalidToken)?;
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|_| AuthError::InvalidToken)?;
        let user_id: u64 = data
            .claims
            .sub
            .parse()
            .map_err(|_| AuthError::InvalidToken)?;

        match self.store.fetch_user(UserId(user_id))? {
            Some(user) => Ok(user),
            None => Err(AuthError::Forbidden),
        }
    }

    /// Authenticates and additionally requires the admin role.
    pub fn require_admin(&self, headers: &HeaderMap) -> Result<User, AuthError> {
        let user = self.authenticate(headers)?;
        if user.role != Role::Admin {
            return Err(AuthError::Forbidden);
        }
        Ok(user)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}
