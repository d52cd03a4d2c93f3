use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use base64::Engine;
use crate::error::{AppError, AppResult};
use crate::tprintln;

use super::principal::SessionIdentity;

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub identity: SessionIdentity,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

#[derive(Default)]
struct SessionTables {
    sessions: HashMap<SessionToken, Session>,
    /// user id -> live tokens
    user_index: HashMap<String, HashSet<SessionToken>>,
}

impl SessionTables {
    fn unindex(&mut self, user_id: &str, token: &str) {
        if let Some(set) = self.user_index.get_mut(user_id) {
            set.remove(token);
            if set.is_empty() { self.user_index.remove(user_id); }
        }
    }
}

fn gen_token() -> Result<String, getrandom::Error> {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// In-process session registry. Cloning shares the same tables.
#[derive(Clone)]
pub struct SessionManager {
    pub ttl: Duration,
    tables: Arc<RwLock<SessionTables>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60 * 24 * 7)) }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, tables: Arc::new(RwLock::new(SessionTables::default())) }
    }

    pub fn issue(&self, identity: SessionIdentity) -> AppResult<Session> {
        let now = Instant::now();
        let token = gen_token()
            .map_err(|e| AppError::internal("session_token", format!("random source unavailable: {e}")))?;
        let sess = Session {
            token: token.clone(),
            identity: identity.clone(),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        {
            let mut t = self.tables.write();
            t.sessions.insert(token.clone(), sess.clone());
            t.user_index.entry(identity.user_id.clone()).or_default().insert(token);
        }
        tprintln!("session.issue user={} ttl_secs={}", identity.user_id, self.ttl.as_secs());
        Ok(sess)
    }

    /// Identity for a live token; expired tokens are dropped on sight.
    pub fn validate(&self, token: &str) -> Option<SessionIdentity> {
        let now = Instant::now();
        {
            let t = self.tables.read();
            match t.sessions.get(token) {
                Some(s) if s.expires_at > now => return Some(s.identity.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        let mut t = self.tables.write();
        if let Some(s) = t.sessions.remove(token) {
            t.unindex(&s.identity.user_id, token);
        }
        None
    }

    pub fn logout(&self, token: &str) -> bool {
        let mut t = self.tables.write();
        match t.sessions.remove(token) {
            Some(s) => {
                t.unindex(&s.identity.user_id, token);
                tprintln!("session.logout user={}", s.identity.user_id);
                true
            }
            None => false,
        }
    }

    /// Replace the identity on every live session of `identity.user_id` (after a phone
    /// number change). Returns the number of sessions updated.
    pub fn refresh_identity(&self, identity: &SessionIdentity) -> usize {
        let mut t = self.tables.write();
        let tokens: Vec<SessionToken> = t
            .user_index
            .get(&identity.user_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        let mut count = 0usize;
        for tok in tokens {
            if let Some(s) = t.sessions.get_mut(&tok) {
                s.identity = identity.clone();
                count += 1;
            }
        }
        count
    }

    /// Drop expired sessions. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut t = self.tables.write();
        let expired: Vec<(SessionToken, String)> = t
            .sessions
            .iter()
            .filter(|(_, s)| s.expires_at <= now)
            .map(|(k, s)| (k.clone(), s.identity.user_id.clone()))
            .collect();
        for (tok, uid) in expired.iter() {
            t.sessions.remove(tok);
            t.unindex(uid, tok);
        }
        expired.len()
    }

    pub fn live_count(&self) -> usize { self.tables.read().sessions.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn ident(id: &str, phone: &str, role: Role) -> SessionIdentity {
        SessionIdentity { user_id: id.into(), phone_number: phone.into(), role }
    }

    #[test]
    fn issue_validate_logout() {
        let sm = SessionManager::default();
        let s = sm.issue(ident("u1", "+15551234567", Role::Client)).unwrap();
        assert_eq!(s.token.len(), 43);
        assert_eq!(sm.validate(&s.token).unwrap().phone_number, "+15551234567");
        assert!(sm.logout(&s.token));
        assert!(sm.validate(&s.token).is_none());
        assert!(!sm.logout(&s.token));
    }

    #[test]
    fn tokens_are_distinct() {
        let sm = SessionManager::default();
        let a = sm.issue(ident("u1", "+15551234567", Role::Client)).unwrap();
        let b = sm.issue(ident("u1", "+15551234567", Role::Client)).unwrap();
        assert_ne!(a.token, b.token);
        assert_ne!(gen_token().unwrap(), gen_token().unwrap());
        assert_eq!(sm.live_count(), 2);
    }

    #[test]
    fn expired_sessions_are_rejected_and_swept() {
        let sm = SessionManager::new(Duration::from_millis(0));
        let a = sm.issue(ident("u1", "+15551234567", Role::Client)).unwrap();
        let _b = sm.issue(ident("u2", "+15557654321", Role::Client)).unwrap();
        assert!(sm.validate(&a.token).is_none());
        assert_eq!(sm.sweep_expired(), 1);
        assert_eq!(sm.live_count(), 0);
    }

    #[test]
    fn refresh_follows_user() {
        let sm = SessionManager::default();
        let a = sm.issue(ident("admin", "+15550000001", Role::Admin)).unwrap();
        let b = sm.issue(ident("admin", "+15550000001", Role::Admin)).unwrap();
        let other = sm.issue(ident("c1", "+15550000002", Role::Client)).unwrap();

        assert_eq!(sm.refresh_identity(&ident("admin", "+15550000009", Role::Admin)), 2);
        assert_eq!(sm.validate(&a.token).unwrap().phone_number, "+15550000009");
        assert_eq!(sm.validate(&b.token).unwrap().phone_number, "+15550000009");
        assert_eq!(sm.validate(&other.token).unwrap().phone_number, "+15550000002");
    }
}
