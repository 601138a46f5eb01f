//! Issuing and validating the bearer tokens that identify the caller.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{Error, user::UserID};

/// How long a token is valid for after it is issued.
pub const DEFAULT_TOKEN_DURATION: Duration = Duration::hours(24);

/// The claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// The user ID as a decimal string.
    pub sub: String,
    /// When the token was issued, in seconds since the Unix epoch.
    pub iat: i64,
    /// When the token expires, in seconds since the Unix epoch.
    pub exp: i64,
}

/// The HS256 keys used to sign and verify tokens.
#[derive(Clone)]
pub struct TokenKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    duration: Duration,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("keys", &"[REDACTED]")
            .field("duration", &self.duration)
            .finish()
    }
}

impl TokenKeys {
    /// Derive the signing and verification keys from a shared secret.
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            duration: DEFAULT_TOKEN_DURATION,
        }
    }

    /// Change how long newly issued tokens are valid for.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Issue a token for `user_id` that expires after the configured duration.
    ///
    /// # Errors
    ///
    /// Returns [Error::TokenCreation] if the token could not be signed.
    pub fn issue(&self, user_id: UserID) -> Result<String, Error> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    /// Issue a token as if it were `issued_at`.
    pub fn issue_at(&self, user_id: UserID, issued_at: OffsetDateTime) -> Result<String, Error> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + self.duration).unix_timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|error| Error::TokenCreation(error.to_string()))
    }

    /// Check `token` and return the user it was issued to.
    ///
    /// Only HS256 is accepted and expiry is checked with no leeway.
    ///
    /// # Errors
    ///
    /// Returns [Error::ExpiredToken] if the token has expired and
    /// [Error::InvalidToken] for any other problem, including a subject that
    /// is not a positive integer.
    pub fn validate(&self, token: &str) -> Result<UserID, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(|error| {
                match error.kind() {
                    ErrorKind::ExpiredSignature => Error::ExpiredToken,
                    _ => {
                        tracing::debug!("rejected token: {error}");
                        Error::InvalidToken
                    }
                }
            })?;

        match token_data.claims.sub.parse::<i64>() {
            Ok(id) if id > 0 => Ok(UserID::new(id)),
            _ => Err(Error::InvalidToken),
        }
    }
}
