use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct Claims {
    /// User id the token was minted for.
    sub: String,
    /// Issued at, unix seconds.
    iat: i64,
    /// Expiry, unix seconds.
    exp: i64,
}

/// Mints and verifies the signed bearer tokens presented in the `connect`
/// handshake frame. Token format: `base64url(claims).base64url(mac)` with
/// an HMAC-SHA256 mac over the encoded claims.
#[derive(Clone)]
pub struct TokenKeeper {
    secret: Vec<u8>,
    ttl_hours: i64,
}

impl TokenKeeper {
    pub fn new(secret: &[u8], ttl_hours: i64) -> Self {
        Self {
            secret: secret.to_vec(),
            ttl_hours,
        }
    }

    /// Mint a token for `user_id`, valid for the configured lifetime.
    pub fn issue(&self, user_id: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = serde_json::json!({
            "sub": user_id,
            "iat": now,
            "exp": now + self.ttl_hours * 3600,
        });
        let body = URL_SAFE_NO_PAD.encode(claims.to_string());
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(body.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}", body, signature)
    }

    /// Check signature and expiry, returning the user id the token names.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        let (body, signature) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::Malformed)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(body.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let body = URL_SAFE_NO_PAD.decode(body).map_err(|_| AuthError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&body).map_err(|_| AuthError::Malformed)?;
        if claims.exp < chrono::Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify_round_trip() {
        let keeper = TokenKeeper::new(b"test-secret", 24);
        let token = keeper.issue("user-1");
        assert_eq!(keeper.verify(&token).unwrap(), "user-1");
    }

    #[test]
    fn test_empty_token_is_missing() {
        let keeper = TokenKeeper::new(b"test-secret", 24);
        assert!(matches!(keeper.verify("  "), Err(AuthError::Missing)));
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let keeper = TokenKeeper::new(b"test-secret", 24);
        assert!(matches!(
            keeper.verify("not-a-token"),
            Err(AuthError::Malformed)
        ));
    }

    #[test]
    fn test_tampered_body_fails_signature() {
        let keeper = TokenKeeper::new(b"test-secret", 24);
        let token = keeper.issue("user-1");
        let (_, signature) = token.split_once('.').unwrap();
        let forged_body = URL_SAFE_NO_PAD.encode("{\"sub\":\"user-2\",\"iat\":0,\"exp\":99999999999}");
        let forged = format!("{}.{}", forged_body, signature);
        assert!(matches!(
            keeper.verify(&forged),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn test_wrong_secret_fails_signature() {
        let token = TokenKeeper::new(b"secret-a", 24).issue("user-1");
        let keeper = TokenKeeper::new(b"secret-b", 24);
        assert!(matches!(
            keeper.verify(&token),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let keeper = TokenKeeper::new(b"test-secret", -1);
        let token = keeper.issue("user-1");
        assert!(matches!(keeper.verify(&token), Err(AuthError::Expired)));
    }
}
