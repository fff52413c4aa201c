use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::crm::types::Session;

const TOKEN_BYTES: usize = 32;

/// Fresh opaque bearer token: 32 random bytes, base64url without padding.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Only this digest is persisted; the raw token lives with the client.
pub fn digest_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Issues a token for `user_id` and the session row that stores its digest.
/// `ttl_hours` is taken as given; see `SessionConfig::effective_ttl_hours`.
pub fn issue_session(user_id: Uuid, ttl_hours: i64, now: DateTime<Utc>) -> (String, Session) {
    let token = generate_session_token();
    let session = Session {
        token_digest: digest_token(&token),
        user_id,
        expires_at: now + Duration::hours(ttl_hours),
        created_at: now,
    };
    (token, session)
}

pub fn is_expired(session: &Session, now: DateTime<Utc>) -> bool {
    session.expires_at <= now
}
