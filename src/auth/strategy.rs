//! Login strategies keyed by provider name.
//!
//! The registry is built once at startup and handed to the router state.
//! Third-party providers plug in by implementing [`AuthStrategy`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::password::{PasswordError, verify_password};
use crate::db::{Database, User};

/// Provider name of email/password accounts.
pub const LOCAL_PROVIDER: &str = "local";

#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Password(#[from] PasswordError),
}

#[async_trait]
pub trait AuthStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resolve credentials to a stored user.
    async fn authenticate(
        &self,
        db: &Database,
        credentials: &LoginCredentials,
    ) -> Result<User, StrategyError>;
}

/// Email and password stored as an Argon2 hash.
pub struct LocalStrategy;

#[async_trait]
impl AuthStrategy for LocalStrategy {
    fn name(&self) -> &'static str {
        LOCAL_PROVIDER
    }

    async fn authenticate(
        &self,
        db: &Database,
        credentials: &LoginCredentials,
    ) -> Result<User, StrategyError> {
        let user = db
            .users()
            .get_by_email(&credentials.email)
            .await?
            .ok_or(StrategyError::InvalidCredentials)?;

        // Accounts linked to an external provider have no password.
        let hash = user
            .password_hash
            .clone()
            .ok_or(StrategyError::InvalidCredentials)?;

        if verify_password(credentials.password.clone(), hash).await? {
            Ok(user)
        } else {
            Err(StrategyError::InvalidCredentials)
        }
    }
}

#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Arc<dyn AuthStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocalStrategy));
        registry
    }

    /// Register a strategy under its own name, replacing any previous one.
    pub fn register(&mut self, strategy: Arc<dyn AuthStrategy>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AuthStrategy>> {
        self.strategies.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.strategies.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_password;
    use crate::db::{NewUser, UserRole};

    struct AlwaysDenied;

    #[async_trait]
    impl AuthStrategy for AlwaysDenied {
        fn name(&self) -> &'static str {
            "denied"
        }

        async fn authenticate(
            &self,
            _db: &Database,
            _credentials: &LoginCredentials,
        ) -> Result<User, StrategyError> {
            Err(StrategyError::InvalidCredentials)
        }
    }

    fn credentials(email: &str, password: &str) -> LoginCredentials {
        LoginCredentials {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = StrategyRegistry::with_defaults();
        registry.register(Arc::new(AlwaysDenied));

        assert_eq!(registry.names(), vec!["denied", "local"]);
        assert!(registry.get("local").is_some());
        assert!(registry.get("google").is_none());
    }

    #[tokio::test]
    async fn test_local_strategy() {
        let db = Database::open(":memory:").await.unwrap();
        let hash = hash_password("hunter22".to_string()).await.unwrap();
        db.users()
            .create(&NewUser {
                uuid: "uuid-1",
                email: "alice@example.com",
                name: None,
                password_hash: Some(&hash),
                role: UserRole::User,
                provider: LOCAL_PROVIDER,
                provider_id: None,
            })
            .await
            .unwrap();

        let user = LocalStrategy
            .authenticate(&db, &credentials("alice@example.com", "hunter22"))
            .await
            .unwrap();
        assert_eq!(user.uuid, "uuid-1");

        let wrong = LocalStrategy
            .authenticate(&db, &credentials("alice@example.com", "nope"))
            .await;
        assert!(matches!(wrong, Err(StrategyError::InvalidCredentials)));

        let unknown = LocalStrategy
            .authenticate(&db, &credentials("bob@example.com", "hunter22"))
            .await;
        assert!(matches!(unknown, Err(StrategyError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_local_strategy_rejects_provider_accounts() {
        let db = Database::open(":memory:").await.unwrap();
        db.users()
            .create(&NewUser {
                uuid: "uuid-1",
                email: "alice@example.com",
                name: None,
                password_hash: None,
                role: UserRole::User,
                provider: "google",
                provider_id: Some("g-123"),
            })
            .await
            .unwrap();

        let result = LocalStrategy
            .authenticate(&db, &credentials("alice@example.com", ""))
            .await;
        assert!(matches!(result, Err(StrategyError::InvalidCredentials)));
    }
}
