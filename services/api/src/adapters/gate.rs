//! services/api/src/adapters/gate.rs
//!
//! The operator access gate. Accepts the long-lived tokens from config and the
//! session tokens it issued on a successful login.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use engagement_core::ports::{AccessGate, PortError, PortResult};
use engagement_core::{Clock, OperatorToken};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::OperatorCredentials;

/// Produces the argon2 PHC string expected in `OPERATOR_PASSWORD_HASH`.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub struct OperatorGate {
    static_tokens: HashSet<String>,
    credentials: Option<OperatorCredentials>,
    session_ttl: Duration,
    /// Issued session token -> expiry. Sessions do not survive a restart.
    sessions: RwLock<HashMap<String, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl OperatorGate {
    pub fn new<I, S>(
        static_tokens: I,
        credentials: Option<OperatorCredentials>,
        session_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            static_tokens: static_tokens.into_iter().map(Into::into).collect(),
            credentials,
            session_ttl,
            sessions: RwLock::new(HashMap::new()),
            clock,
        }
    }

    async fn password_matches(&self, hash: &str, password: &str) -> PortResult<bool> {
        let hash = hash.to_string();
        let password = password.to_string();
        // Hash verification is CPU bound.
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| PortError::Unexpected(format!("stored password hash: {e}")))?;
            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?
    }
}

#[async_trait]
impl AccessGate for OperatorGate {
    async fn is_authorized(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        if self.static_tokens.contains(token) {
            return true;
        }
        let now = self.clock.now();
        self.sessions
            .read()
            .await
            .get(token)
            .is_some_and(|expires_at| *expires_at > now)
    }

    async fn login(&self, email: &str, password: &str) -> PortResult<Option<OperatorToken>> {
        let Some(credentials) = &self.credentials else {
            warn!("Login attempted but no operator account is configured");
            return Ok(None);
        };
        if !credentials.email.eq_ignore_ascii_case(email.trim()) {
            return Ok(None);
        }
        if !self.password_matches(&credentials.password_hash, password).await? {
            return Ok(None);
        }

        let now = self.clock.now();
        let issued = OperatorToken {
            token: Uuid::new_v4().simple().to_string(),
            expires_at: now + self.session_ttl,
        };
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, expires_at| *expires_at > now);
        sessions.insert(issued.token.clone(), issued.expires_at);
        info!(expires_at = %issued.expires_at, "Operator logged in");
        Ok(Some(issued))
    }

    async fn logout(&self, token: &str) -> PortResult<()> {
        if self.sessions.write().await.remove(token).is_some() {
            info!("Operator session revoked");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use engagement_core::ManualClock;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn gate_with_login(clock: Arc<ManualClock>) -> OperatorGate {
        let credentials = OperatorCredentials {
            email: "ops@example.com".to_string(),
            password_hash: hash_password("hunter2").unwrap(),
        };
        OperatorGate::new(Vec::<String>::new(), Some(credentials), Duration::hours(1), clock)
    }

    #[tokio::test]
    async fn only_configured_tokens_pass() {
        let gate = OperatorGate::new(["alpha", "beta"], None, Duration::hours(1), clock());
        assert!(gate.is_authorized("alpha").await);
        assert!(gate.is_authorized("beta").await);
        assert!(!gate.is_authorized("gamma").await);
        assert!(!gate.is_authorized("").await);
    }

    #[tokio::test]
    async fn login_issues_a_token_that_expires() {
        let clock = clock();
        let gate = gate_with_login(clock.clone());

        let issued = gate.login("OPS@example.com ", "hunter2").await.unwrap().unwrap();
        assert_eq!(issued.expires_at, clock.now() + Duration::hours(1));
        assert!(gate.is_authorized(&issued.token).await);

        clock.advance(Duration::minutes(61));
        assert!(!gate.is_authorized(&issued.token).await);
    }

    #[tokio::test]
    async fn wrong_credentials_issue_nothing() {
        let gate = gate_with_login(clock());
        assert!(gate.login("ops@example.com", "hunter3").await.unwrap().is_none());
        assert!(gate.login("other@example.com", "hunter2").await.unwrap().is_none());

        let no_account = OperatorGate::new(["alpha"], None, Duration::hours(1), clock());
        assert!(no_account.login("ops@example.com", "hunter2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_revokes_the_session() {
        let gate = gate_with_login(clock());
        let issued = gate.login("ops@example.com", "hunter2").await.unwrap().unwrap();
        gate.logout(&issued.token).await.unwrap();
        assert!(!gate.is_authorized(&issued.token).await);
        gate.logout("never-issued").await.unwrap();
    }
}
