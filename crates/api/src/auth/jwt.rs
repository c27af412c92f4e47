//! Session token signing
//!
//! Tokens carry `(user_id, tenant_id, jti)` and nothing else — never the
//! derived role type, which is recomputed from the live membership row on
//! every request so role and branch changes take effect without reissue.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dukapo_shared::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    /// Tenant the session is bound to.
    pub tenant_id: Uuid,
    /// Session id; revocation checks key on this.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtManager {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Issue a token for `(user, tenant)`. Returns the token, its jti, and
    /// the expiry for the session row.
    pub fn issue(&self, user_id: Uuid, tenant_id: Uuid) -> AppResult<(String, String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let jti = new_jti();

        let claims = Claims {
            sub: user_id,
            tenant_id,
            jti: jti.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("token signing failed: {e}")))?;

        Ok((token, jti, expires_at))
    }

    pub fn validate(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthenticated)
    }
}

fn new_jti() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_validate() {
        let manager = JwtManager::new("test-secret-key", 24);
        let user = Uuid::new_v4();
        let tenant = Uuid::new_v4();

        let (token, jti, expires_at) = manager.issue(user, tenant).unwrap();
        let claims = manager.validate(&token).unwrap();

        assert_eq!(claims.sub, user);
        assert_eq!(claims.tenant_id, tenant);
        assert_eq!(claims.jti, jti);
        assert!(expires_at > Utc::now());
    }

    #[test]
    fn wrong_secret_rejected() {
        let a = JwtManager::new("secret-a", 24);
        let b = JwtManager::new("secret-b", 24);
        let (token, _, _) = a.issue(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        assert!(b.validate(&token).is_err());
    }

    #[test]
    fn garbage_token_rejected() {
        let manager = JwtManager::new("secret", 24);
        assert!(manager.validate("not.a.token").is_err());
        assert!(manager.validate("").is_err());
    }

    #[test]
    fn jtis_are_unique() {
        assert_ne!(new_jti(), new_jti());
        assert_eq!(new_jti().len(), 32);
    }

    #[test]
    fn claims_carry_no_role() {
        // Role and branch must be recomputed per request, never frozen
        // into the token.
        let claims = Claims {
            sub: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            jti: new_jti(),
            iat: 0,
            exp: i64::MAX,
        };
        let json = serde_json::to_value(&claims).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), 5);
        assert!(!keys.iter().any(|k| k.contains("role") || k.contains("branch")));
    }
}
