use anyhow::Context;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> Result<OffsetDateTime, anyhow::Error> {
        OffsetDateTime::from_unix_timestamp(self.exp).context("Invalid expiry timestamp")
    }
}

pub struct IssuedToken {
    pub token: String,
    pub token_id: Uuid,
    pub expires_at: OffsetDateTime,
}

/// Signs and verifies the HS256 bearer tokens handed out on login.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: time::Duration,
}

impl JwtKeys {
    pub fn new(secret: &Secret<String>, ttl: time::Duration) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<IssuedToken, anyhow::Error> {
        self.issue_at(user_id, email, OffsetDateTime::now_utc())
    }

    pub fn issue_at(
        &self,
        user_id: Uuid,
        email: &str,
        issued_at: OffsetDateTime,
    ) -> Result<IssuedToken, anyhow::Error> {
        let expires_at = issued_at
            .checked_add(self.ttl)
            .context("unable to compute expiry timestamp")?;

        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            jti: Uuid::new_v4(),
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("Failed to sign token")?;

        Ok(IssuedToken {
            token,
            token_id: claims.jti,
            expires_at,
        })
    }

    pub fn decode(&self, token: &str) -> Result<Claims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .context("The token is invalid or expired")?;

        Ok(data.claims)
    }
}
