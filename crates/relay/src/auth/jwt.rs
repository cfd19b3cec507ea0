use anyhow::{anyhow, bail, Context};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 30 * 60;

// Tokens are minted by the account API; the relay only verifies them, but
// issuing is kept for tests and tooling.
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS512;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccessTokenClaims {
    user_id: Uuid,
    username: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Clone)]
pub struct JwtAccessTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAccessTokenService {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("jwt secret must be at least 32 characters long");
        }

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn issue_access_token(&self, user_id: Uuid, username: &str) -> anyhow::Result<String> {
        self.issue_access_token_at(user_id, username, current_unix_timestamp()?)
    }

    fn issue_access_token_at(
        &self,
        user_id: Uuid,
        username: &str,
        issued_at: i64,
    ) -> anyhow::Result<String> {
        let claims = AccessTokenClaims {
            user_id,
            username: username.to_string(),
            iat: issued_at,
            exp: issued_at + ACCESS_TOKEN_TTL_SECONDS,
        };

        encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key)
            .context("failed to encode access token")
    }

    pub fn validate_access_token(&self, token: &str) -> anyhow::Result<AccessClaims> {
        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .context("failed to decode access token")?
            .claims;

        Ok(AccessClaims { user_id: claims.user_id, username: claims.username })
    }
}

fn current_unix_timestamp() -> anyhow::Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| anyhow!("system clock is before unix epoch: {error}"))?;

    i64::try_from(duration.as_secs()).context("unix timestamp overflow")
}
