//! Bearer-token verification contract
//!
//! Operator requests carry `Authorization: Bearer <token>`. Token minting
//! lives outside this service; verification goes through a narrow
//! contract so the JWT default can be swapped for an introspection
//! endpoint.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Identity resolved from a bearer token
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub user_id: String,
    pub email: String,
}

/// Bearer-token verifier
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// `None` for invalid, expired, or malformed tokens.
    async fn verify(&self, token: &str) -> Option<VerifiedToken>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    exp: usize,
    iat: usize,
}

/// HS256 JWT implementation of [`TokenVerifier`]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        JwtVerifier {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Option<VerifiedToken> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).ok()?;
        Some(VerifiedToken {
            user_id: data.claims.sub,
            email: data.claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "user-1".into(),
            email: "user@example.com".into(),
            exp: (now + exp_offset) as usize,
            iat: now as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn accepts_a_valid_token() {
        let verifier = JwtVerifier::new("secret");
        let verified = verifier.verify(&token("secret", 3600)).await.unwrap();
        assert_eq!(verified.user_id, "user-1");
        assert_eq!(verified.email, "user@example.com");
    }

    #[tokio::test]
    async fn rejects_bad_signature_and_expired_tokens() {
        let verifier = JwtVerifier::new("secret");
        assert!(verifier.verify(&token("other-secret", 3600)).await.is_none());
        assert!(verifier.verify(&token("secret", -3600)).await.is_none());
        assert!(verifier.verify("not-a-jwt").await.is_none());
    }
}
