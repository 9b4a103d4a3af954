//! Identity layer: password login and bearer token verification.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use kvgate_storage::{RequestContext, StorageError, UserStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(600);

/// Claims carried by an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username the token was issued to.
    pub name: String,
    /// Expiry as seconds since the Unix epoch.
    pub exp: u64,
}

/// Errors that can occur in the identity layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("username and password are required")]
    MissingCredentials,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("user not found: {username}")]
    UserNotFound { username: String },

    #[error("invalid token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign token: {0}")]
    Token(#[source] jsonwebtoken::errors::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AuthError {
    /// Returns true for errors caused by the caller's credentials rather
    /// than by the service.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::MissingCredentials
                | AuthError::InvalidCredentials
                | AuthError::UserNotFound { .. }
                | AuthError::InvalidToken(_)
        )
    }
}

/// Issues HS256 tokens for valid logins and verifies them on later requests.
pub struct AuthService<U: UserStore> {
    users: Arc<U>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl<U: UserStore> AuthService<U> {
    /// Creates a service signing with `secret`.
    pub fn new(users: Arc<U>, secret: &str, token_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            users,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            token_ttl,
        }
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Checks the password for `username` and returns a signed token.
    #[instrument(skip(self, ctx, password))]
    pub async fn login(
        &self,
        ctx: &RequestContext,
        username: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let user = self.lookup(ctx, username).await?;
        if user.password != password {
            warn!("password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.issue_token(username)?;
        debug!("token issued");
        Ok(token)
    }

    /// Signs a token for `username` expiring after the configured TTL.
    pub fn issue_token(&self, username: &str) -> Result<String, AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let claims = Claims {
            name: username.to_string(),
            exp: (now + self.token_ttl).as_secs(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(AuthError::Token)
    }

    /// Validates signature and expiry and returns the token's username.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.name)
            .map_err(AuthError::InvalidToken)
    }

    /// Confirms that `username` still exists.
    pub async fn find_user(&self, ctx: &RequestContext, username: &str) -> Result<(), AuthError> {
        self.lookup(ctx, username).await.map(|_| ())
    }

    async fn lookup(
        &self,
        ctx: &RequestContext,
        username: &str,
    ) -> Result<kvgate_storage::User, AuthError> {
        match self.users.get_user(ctx, username).await {
            Ok(user) => Ok(user),
            Err(StorageError::UserNotFound { username }) => {
                Err(AuthError::UserNotFound { username })
            }
            Err(err) => Err(AuthError::Storage(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvgate_storage::MemoryDataStore;

    const SECRET: &str = "test-secret";

    fn service() -> AuthService<MemoryDataStore> {
        let users = Arc::new(MemoryDataStore::new().with_user("alice", "wonderland"));
        AuthService::new(users, SECRET, DEFAULT_TOKEN_TTL)
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_token() {
        let auth = service();
        let ctx = RequestContext::background();

        let token = auth.login(&ctx, "alice", "wonderland").await.unwrap();

        assert_eq!(auth.verify(&token).unwrap(), "alice");
    }

    #[tokio::test]
    async fn test_token_expires_after_ttl() {
        let auth = service();
        let token = auth.issue_token("alice").unwrap();

        let data = decode::<Claims>(&token, &auth.decoding_key, &auth.validation).unwrap();
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let ttl = DEFAULT_TOKEN_TTL.as_secs();
        assert!(data.claims.exp >= now + ttl - 5 && data.claims.exp <= now + ttl + 5);
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_password() {
        let auth = service();
        let err = auth
            .login(&RequestContext::background(), "alice", "guess")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_login_rejects_unknown_user() {
        let auth = service();
        let err = auth
            .login(&RequestContext::background(), "bob", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound { .. }));
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_login_requires_both_fields() {
        let auth = service();
        let ctx = RequestContext::background();

        for (username, password) in [("", "pw"), ("alice", ""), ("", "")] {
            let err = auth.login(&ctx, username, password).await.unwrap_err();
            assert!(matches!(err, AuthError::MissingCredentials));
        }
    }

    #[test]
    fn test_verify_rejects_token_signed_with_other_secret() {
        let other = AuthService::new(
            Arc::new(MemoryDataStore::new()),
            "another-secret",
            DEFAULT_TOKEN_TTL,
        );
        let token = other.issue_token("alice").unwrap();

        let err = service().verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let auth = service();
        let claims = Claims {
            name: "alice".to_string(),
            exp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs()
                - 120,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(auth.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_verify_rejects_non_hs256_algorithm() {
        let auth = service();
        let claims = Claims {
            name: "alice".to_string(),
            exp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs()
                + 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(auth.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        assert!(matches!(
            service().verify("not.a.token"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_find_user() {
        let auth = service();
        let ctx = RequestContext::background();

        assert!(auth.find_user(&ctx, "alice").await.is_ok());
        assert!(matches!(
            auth.find_user(&ctx, "mallory").await,
            Err(AuthError::UserNotFound { .. })
        ));
    }
}
