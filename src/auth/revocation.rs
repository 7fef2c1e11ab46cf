//! Revocation checks for decoded tokens.
//!
//! A subject's revocation record holds the earliest issue time (Unix
//! milliseconds) its tokens must carry. Lookups go through a short-TTL cache so
//! hot subjects do not hit the store on every request. The cache stores `None`
//! for subjects without a record.

use std::sync::Arc;
use tracing::{error, warn};

use super::errors::AuthError;
use crate::cache::KeyValueCache;
use crate::db::Database;
use crate::jwt::{JwtError, TokenClaims, unix_now_ms};

/// Cache of `subject -> invalidated_at`.
pub type RevocationCache = dyn KeyValueCache<Option<u64>>;

/// Store reads made while filling the cache before giving up on it.
const MAX_FILL_ATTEMPTS: usize = 3;

/// Errors from recording a revocation.
#[derive(Debug, thiserror::Error)]
pub enum RevocationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Clock(#[from] JwtError),
}

pub struct RevocationChecker {
    db: Database,
    cache: Arc<RevocationCache>,
    fail_open: bool,
}

fn cache_key(subject: &str) -> String {
    format!("revocation:{}", subject)
}

impl RevocationChecker {
    /// `fail_open` lets requests through when the store cannot be reached.
    /// The default deployment fails closed.
    pub fn new(db: Database, cache: Arc<RevocationCache>, fail_open: bool) -> Self {
        Self {
            db,
            cache,
            fail_open,
        }
    }

    /// Reject the token if its subject was invalidated after it was issued.
    pub async fn check(&self, claims: &TokenClaims) -> Result<(), AuthError> {
        let invalidated_at = match self.invalidated_at(&claims.sub).await {
            Ok(at) => at,
            Err(e) if self.fail_open => {
                warn!(subject = %claims.sub, error = %e, "Revocation lookup failed, allowing request");
                return Ok(());
            }
            Err(e) => {
                error!(subject = %claims.sub, error = %e, "Revocation lookup failed");
                return Err(AuthError::StoreUnavailable);
            }
        };

        match invalidated_at {
            Some(at) if at > claims.issued_at_ms() => Err(AuthError::TokenRevoked),
            _ => Ok(()),
        }
    }

    async fn invalidated_at(&self, subject: &str) -> Result<Option<u64>, sqlx::Error> {
        let key = cache_key(subject);
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        // A writer can commit and clear the key between our read and our fill.
        // Records only move forward, so a re-read after the fill exposes it.
        let mut at = self.db.revocations().get(subject).await?;
        for _ in 0..MAX_FILL_ATTEMPTS {
            self.cache.set(&key, at).await;
            let current = self.db.revocations().get(subject).await?;
            if current == at {
                return Ok(at);
            }
            at = current;
        }

        self.cache.delete(&key).await;
        Ok(at)
    }

    /// Invalidate every token issued for `subject` up to now.
    /// Returns the recorded timestamp; tokens issued at or after it stay valid.
    pub async fn revoke(&self, subject: &str) -> Result<u64, RevocationError> {
        let at = unix_now_ms()? + 1;
        self.revoke_at(subject, at).await?;
        Ok(at)
    }

    /// Record an invalidation at an explicit timestamp (Unix milliseconds) and
    /// drop the cached state.
    pub async fn revoke_at(&self, subject: &str, at: u64) -> Result<(), sqlx::Error> {
        self.db.revocations().invalidate(subject, at).await?;
        self.cache.delete(&cache_key(subject)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    fn claims(sub: &str, iat_ms: u64) -> TokenClaims {
        TokenClaims {
            sub: sub.to_string(),
            role: None,
            iat: iat_ms / 1000,
            exp: iat_ms / 1000 + 60,
            iat_ms: Some(iat_ms),
            provider: None,
            provider_id: None,
            email: None,
            name: None,
            photo: None,
            created_at: None,
            extra_user_data: None,
        }
    }

    async fn checker() -> (RevocationChecker, Database, Arc<MemoryCache<Option<u64>>>) {
        let db = Database::open(":memory:").await.unwrap();
        let cache = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        (
            RevocationChecker::new(db.clone(), cache.clone(), false),
            db,
            cache,
        )
    }

    #[tokio::test]
    async fn test_no_record_allows() {
        let (checker, _db, cache) = checker().await;

        assert_eq!(checker.check(&claims("uuid-1", 1_000_000)).await, Ok(()));
        // The miss is cached as "no record".
        assert_eq!(cache.get("revocation:uuid-1").await, Some(None));
    }

    #[tokio::test]
    async fn test_record_at_or_before_issue_time_allows() {
        let (checker, _db, _cache) = checker().await;

        checker.revoke_at("uuid-1", 1_000_000).await.unwrap();
        assert_eq!(checker.check(&claims("uuid-1", 1_000_000)).await, Ok(()));
        assert_eq!(checker.check(&claims("uuid-1", 1_000_001)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_record_after_issue_time_revokes() {
        let (checker, _db, _cache) = checker().await;

        checker.revoke_at("uuid-1", 1_000_000).await.unwrap();
        assert_eq!(
            checker.check(&claims("uuid-1", 999_999)).await,
            Err(AuthError::TokenRevoked)
        );
    }

    #[tokio::test]
    async fn test_revoke_covers_token_issued_this_millisecond() {
        let (checker, _db, _cache) = checker().await;
        let issued = unix_now_ms().unwrap();

        let at = checker.revoke("uuid-1").await.unwrap();
        assert!(at > issued);
        assert_eq!(
            checker.check(&claims("uuid-1", issued)).await,
            Err(AuthError::TokenRevoked)
        );
        assert_eq!(checker.check(&claims("uuid-1", at)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_seconds_only_token_compared_at_second_start() {
        let (checker, _db, _cache) = checker().await;
        let mut legacy = claims("uuid-1", 0);
        legacy.iat = 1000;
        legacy.iat_ms = None;

        checker.revoke_at("uuid-1", 1_000_001).await.unwrap();
        assert_eq!(checker.check(&legacy).await, Err(AuthError::TokenRevoked));
    }

    #[tokio::test]
    async fn test_revoke_invalidates_cached_state() {
        let (checker, _db, cache) = checker().await;

        assert_eq!(checker.check(&claims("uuid-1", 500_000)).await, Ok(()));
        checker.revoke_at("uuid-1", 1_000_000).await.unwrap();

        assert_eq!(cache.get("revocation:uuid-1").await, None);
        assert_eq!(
            checker.check(&claims("uuid-1", 500_000)).await,
            Err(AuthError::TokenRevoked)
        );
    }

    /// Cache that lets a revocation land between a reader's store lookup and
    /// its cache fill.
    struct InterleavingCache {
        inner: MemoryCache<Option<u64>>,
        db: Database,
        pending: Mutex<Option<(String, u64)>>,
    }

    #[async_trait]
    impl KeyValueCache<Option<u64>> for InterleavingCache {
        async fn get(&self, key: &str) -> Option<Option<u64>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Option<u64>) {
            let pending = self.pending.lock().unwrap().take();
            if let Some((subject, at)) = pending {
                self.db.revocations().invalidate(&subject, at).await.unwrap();
                self.inner.delete(key).await;
            }
            self.inner.set(key, value).await;
        }

        async fn delete(&self, key: &str) {
            self.inner.delete(key).await;
        }

        async fn clear(&self) {
            self.inner.clear().await;
        }
    }

    #[tokio::test]
    async fn test_concurrent_revoke_during_fill_is_not_lost() {
        let db = Database::open(":memory:").await.unwrap();
        let cache = Arc::new(InterleavingCache {
            inner: MemoryCache::new(Duration::from_secs(60)),
            db: db.clone(),
            pending: Mutex::new(Some(("uuid-1".to_string(), 1_000_000))),
        });
        let checker = RevocationChecker::new(db, cache.clone(), false);

        // The store read sees no record; the revocation commits before the fill.
        assert_eq!(
            checker.check(&claims("uuid-1", 500_000)).await,
            Err(AuthError::TokenRevoked)
        );
        assert_eq!(cache.get("revocation:uuid-1").await, Some(Some(1_000_000)));
        assert_eq!(
            checker.check(&claims("uuid-1", 500_000)).await,
            Err(AuthError::TokenRevoked)
        );
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let (checker, db, _cache) = checker().await;
        db.pool().close().await;

        assert_eq!(
            checker.check(&claims("uuid-1", 500_000)).await,
            Err(AuthError::StoreUnavailable)
        );
    }

    #[tokio::test]
    async fn test_store_failure_fail_open() {
        let db = Database::open(":memory:").await.unwrap();
        let cache = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        let checker = RevocationChecker::new(db.clone(), cache, true);
        db.pool().close().await;

        assert_eq!(checker.check(&claims("uuid-1", 500_000)).await, Ok(()));
    }
}
