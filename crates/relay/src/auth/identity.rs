use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::error;
use uuid::Uuid;

use crate::{auth::jwt::JwtAccessTokenService, store::SocialStore, store::UserRecord, ws::error::SocketError};

const MISSING_CREDENTIAL: &str = "Auth bearer not set";
const MISSING_BEARER: &str = "Bearer token is not provided!";
const INVALID_TOKEN: &str = "Auth Token is Invalid or Expired!";

/// Who is on the other end of a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(UserRecord),
    /// The in-app service authenticated with the shared socket secret.
    Service,
}

impl Identity {
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Service)
    }

    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Self::User(user) => Some(user),
            Self::Service => None,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user().map(|user| user.id)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Service => "service",
        }
    }
}

/// Turns the raw `Authorization` header of an upgrade request into an [`Identity`].
#[derive(Clone)]
pub struct IdentityResolver {
    jwt_service: Arc<JwtAccessTokenService>,
    socket_secret: Option<Arc<str>>,
    store: SocialStore,
}

impl IdentityResolver {
    pub fn new(
        jwt_service: Arc<JwtAccessTokenService>,
        socket_secret: Option<String>,
        store: SocialStore,
    ) -> Self {
        Self {
            jwt_service,
            socket_secret: socket_secret.filter(|secret| !secret.is_empty()).map(Arc::from),
            store,
        }
    }

    pub async fn resolve(&self, credential: Option<&str>) -> Result<Identity, SocketError> {
        let credential = credential.unwrap_or_default();
        if credential.is_empty() {
            return Err(SocketError::auth(MISSING_CREDENTIAL));
        }

        if self.is_service_secret(credential) {
            return Ok(Identity::Service);
        }

        let token = extract_bearer_token(credential).ok_or_else(|| SocketError::auth(MISSING_BEARER))?;
        let claims = self
            .jwt_service
            .validate_access_token(token)
            .map_err(|_| SocketError::auth(INVALID_TOKEN))?;

        match self.store.user_by_access_token(claims.user_id, token).await {
            Ok(Some(user)) => Ok(Identity::User(user)),
            Ok(None) => Err(SocketError::auth(INVALID_TOKEN)),
            Err(error) => {
                error!(error = ?error, user_id = %claims.user_id, "failed to load socket user");
                Err(SocketError::internal(error))
            }
        }
    }

    fn is_service_secret(&self, credential: &str) -> bool {
        self.socket_secret
            .as_deref()
            .is_some_and(|secret| bool::from(credential.as_bytes().ct_eq(secret.as_bytes())))
    }
}

fn extract_bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    Some(token)
}
