use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Ten years; keeps the expiry arithmetic in range.
const MAX_TTL_HOURS: u64 = 24 * 365 * 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signing secret is empty")]
    EmptySecret,

    #[error("could not sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),

    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

/// Issues and verifies the signed bearer tokens that identify a user.
/// Stateless: nothing about issued tokens is stored server-side.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_hours: u64) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::hours(ttl_hours.min(MAX_TTL_HOURS) as i64),
        })
    }

    pub fn issue(&self, user_id: &str, user_name: &str) -> Result<String, TokenError> {
        self.issue_at(user_id, user_name, Utc::now())
    }

    pub fn issue_at(
        &self,
        user_id: &str,
        user_name: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            id: user_id.to_string(),
            name: user_name.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Sign)
    }

    /// Checks signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret", 24).unwrap()
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            TokenService::new("", 24),
            Err(TokenError::EmptySecret)
        ));
    }

    #[test]
    fn issued_token_verifies() {
        let tokens = service();
        let token = tokens.issue("user-1", "Ada").unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.id, "user-1");
        assert_eq!(claims.name, "Ada");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn token_still_valid_near_end_of_window() {
        let tokens = service();
        let issued = Utc::now() - Duration::hours(23);
        let token = tokens.issue_at("user-1", "Ada", issued).unwrap();
        assert!(tokens.verify(&token).is_ok());
    }

    #[test]
    fn expired_token_fails() {
        let tokens = service();
        let issued = Utc::now() - Duration::hours(25);
        let token = tokens.issue_at("user-1", "Ada", issued).unwrap();
        assert!(matches!(tokens.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn tampered_signature_fails() {
        let tokens = service();
        let token = tokens.issue("user-1", "Ada").unwrap();
        let (rest, signature) = token.rsplit_once('.').unwrap();
        let flipped = if signature.starts_with('A') { 'B' } else { 'A' };
        let tampered = format!("{rest}.{flipped}{}", &signature[1..]);
        assert!(tokens.verify(&tampered).is_err());
    }

    #[test]
    fn token_from_other_key_fails() {
        let other = TokenService::new("another-secret", 24).unwrap();
        let token = other.issue("user-1", "Ada").unwrap();
        assert!(service().verify(&token).is_err());
    }

    #[test]
    fn garbage_fails() {
        assert!(service().verify("not-a-token").is_err());
        assert!(service().verify("").is_err());
    }
}
