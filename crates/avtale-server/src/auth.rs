//! Credential hashing, the in-process session table and the bearer-token
//! extractor used by authenticated handlers.

use std::time::{Duration, Instant};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use dashmap::DashMap;
use uuid::Uuid;

use avtale_core::{Actor, ProviderId, RequesterId, Role, SessionHandle, SessionProbe};

use crate::error::ApiError;
use crate::state::AppState;

/// Hash a password into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string. Malformed hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored credential hash is malformed: {}", e);
            false
        }
    }
}

/// One signed-in user.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub username: String,
    pub role: Role,
    /// `None` for administrators.
    pub actor: Option<Actor>,
    pub expires_at: Instant,
}

impl SessionInfo {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Token -> session table. A token is live until it expires or is removed.
pub struct SessionStore {
    sessions: DashMap<String, SessionInfo>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, handle: &SessionHandle, username: &str, role: Role, actor: Option<Actor>) {
        self.sessions.insert(
            handle.as_str().to_string(),
            SessionInfo {
                username: username.to_string(),
                role,
                actor,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Look up a live session by token.
    pub fn get(&self, token: &str) -> Option<SessionInfo> {
        let info = self.sessions.get(token)?.value().clone();
        if info.is_expired(Instant::now()) {
            return None;
        }
        Some(info)
    }

    pub fn remove(&self, token: &str) -> Option<SessionInfo> {
        self.sessions.remove(token).map(|(_, info)| info)
    }

    /// Remove expired sessions, returning each username with its dead handle.
    pub fn prune_expired(&self) -> Vec<(String, SessionHandle)> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.sessions.retain(|token, info| {
            if info.is_expired(now) {
                expired.push((info.username.clone(), SessionHandle::from(token.clone())));
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionProbe for SessionStore {
    fn is_live(&self, handle: &SessionHandle) -> bool {
        self.get(handle.as_str()).is_some()
    }
}

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub info: SessionInfo,
}

impl AuthSession {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.info.role != Role::Admin {
            return Err(ApiError::Forbidden("administrator only".to_string()));
        }
        Ok(())
    }

    pub fn actor(&self) -> Result<Actor, ApiError> {
        self.info
            .actor
            .ok_or_else(|| ApiError::Forbidden("no provider or requester profile".to_string()))
    }

    pub fn requester(&self) -> Result<RequesterId, ApiError> {
        match self.actor()? {
            Actor::Requester(id) => Ok(id),
            Actor::Provider(_) => Err(ApiError::Forbidden("requesters only".to_string())),
        }
    }

    pub fn provider(&self) -> Result<ProviderId, ApiError> {
        match self.actor()? {
            Actor::Provider(id) => Ok(id),
            Actor::Requester(_) => Err(ApiError::Forbidden("providers only".to_string())),
        }
    }
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthenticated)?;

        let info = state
            .sessions
            .get(token)
            .ok_or(ApiError::Unauthenticated)?;

        Ok(AuthSession {
            token: token.to_string(),
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_session_expiry() {
        let store = SessionStore::new(Duration::ZERO);
        let handle = SessionHandle::generate();
        store.insert(&handle, "kari", Role::Requester, None);

        assert!(store.get(handle.as_str()).is_none());
        assert!(!store.is_live(&handle));
        assert_eq!(store.prune_expired(), vec![("kari".to_string(), handle)]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_session_lookup_and_remove() {
        let store = SessionStore::new(Duration::from_secs(60));
        let handle = SessionHandle::generate();
        let actor = Some(Actor::Requester(RequesterId(3)));
        store.insert(&handle, "kari", Role::Requester, actor);

        let info = store.get(handle.as_str()).unwrap();
        assert_eq!(info.username, "kari");
        assert_eq!(info.actor, actor);
        assert!(store.is_live(&handle));

        assert!(store.remove(handle.as_str()).is_some());
        assert!(!store.is_live(&handle));
        assert!(store.prune_expired().is_empty());
    }
}
