use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::ids::UserId;

/// Identity verification capability. The actual identity service is an
/// external collaborator - the Supervisor only ever calls through this
/// trait, never at a concrete auth provider directly.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserId>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: UserId,
}

/// Stock `AuthVerifier` backed by a shared HS256 secret. Good enough to
/// compile and exercise the authenticate-first-message handshake end to
/// end; a production deployment would point this at the real identity
/// service's signing key instead.
pub struct JwtAuthVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::default(),
        }
    }
}

#[async_trait]
impl AuthVerifier for JwtAuthVerifier {
    async fn verify(&self, token: &str) -> Result<UserId> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| Error::Unauthenticated(e.to_string()))?;
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct SignClaims {
        sub: UserId,
        exp: usize,
    }

    #[tokio::test]
    async fn verify_accepts_a_well_signed_token() {
        let secret = b"test-secret";
        let user_id = UserId::new();
        let token = encode(
            &Header::default(),
            &SignClaims {
                sub: user_id,
                exp: (chrono::Utc::now().timestamp() + 3600) as usize,
            },
            &EncodingKey::from_secret(secret),
        )
        .unwrap();

        let verifier = JwtAuthVerifier::new(secret);
        let verified = verifier.verify(&token).await.unwrap();
        assert_eq!(verified, user_id);
    }

    #[tokio::test]
    async fn verify_rejects_a_token_signed_with_a_different_secret() {
        let user_id = UserId::new();
        let token = encode(
            &Header::default(),
            &SignClaims {
                sub: user_id,
                exp: (chrono::Utc::now().timestamp() + 3600) as usize,
            },
            &EncodingKey::from_secret(b"other-secret"),
        )
        .unwrap();

        let verifier = JwtAuthVerifier::new(b"test-secret");
        assert!(verifier.verify(&token).await.is_err());
    }
}
