//! Applications and their API keys.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct ApplicationStore {
    pool: SqlitePool,
}

/// An application joined with the UUIDs of its owner and organization.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Application {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub api_key: String,
    pub user_id: i64,
    pub owner_uuid: String,
    pub organization_id: Option<i64>,
    pub organization_uuid: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewApplication<'a> {
    pub uuid: &'a str,
    pub name: &'a str,
    pub api_key: &'a str,
    pub user_id: i64,
    pub organization_id: Option<i64>,
}

/// Public application representation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    pub id: String,
    pub name: String,
    pub api_key_value: String,
    pub user_id: String,
    pub organization: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Application> for ApplicationSummary {
    fn from(app: Application) -> Self {
        Self {
            id: app.uuid,
            name: app.name,
            api_key_value: app.api_key,
            user_id: app.owner_uuid,
            organization: app.organization_uuid,
            created_at: app.created_at,
            updated_at: app.updated_at,
        }
    }
}

macro_rules! select_applications {
    ($tail:literal) => {
        concat!(
            "SELECT a.id, a.uuid, a.name, a.api_key, a.user_id, u.uuid AS owner_uuid, a.organization_id, o.uuid AS organization_uuid, a.created_at, a.updated_at
             FROM applications a
             JOIN users u ON u.id = a.user_id
             LEFT JOIN organizations o ON o.id = a.organization_id ",
            $tail
        )
    };
}

impl ApplicationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, app: &NewApplication<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO applications (uuid, name, api_key, user_id, organization_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(app.uuid)
        .bind(app.name)
        .bind(app.api_key)
        .bind(app.user_id)
        .bind(app.organization_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Application>, sqlx::Error> {
        sqlx::query_as(select_applications!("WHERE a.uuid = ?"))
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_by_api_key(&self, api_key: &str) -> Result<Option<Application>, sqlx::Error> {
        sqlx::query_as(select_applications!("WHERE a.api_key = ?"))
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await
    }

    /// Update name and organization link in one statement.
    pub async fn update(
        &self,
        id: i64,
        name: &str,
        organization_id: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE applications SET name = ?, organization_id = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(name)
        .bind(organization_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_api_key(&self, id: i64, api_key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE applications SET api_key = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(api_key)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM applications WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count applications, optionally restricted to one owner.
    pub async fn count(&self, owner: Option<i64>) -> Result<i64, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM applications WHERE ?1 IS NULL OR user_id = ?1")
                .bind(owner)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    /// List applications, optionally restricted to one owner.
    pub async fn list(
        &self,
        owner: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Application>, sqlx::Error> {
        sqlx::query_as(select_applications!(
            "WHERE ?1 IS NULL OR a.user_id = ?1 ORDER BY a.created_at, a.id LIMIT ?2 OFFSET ?3"
        ))
        .bind(owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, NewApplication, NewUser, UserRole};

    async fn create_user(db: &Database, uuid: &str, email: &str) -> i64 {
        db.users()
            .create(&NewUser {
                uuid,
                email,
                name: None,
                password_hash: None,
                role: UserRole::User,
                provider: "local",
                provider_id: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_filters_by_owner() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = create_user(&db, "uuid-a", "alice@example.com").await;
        let bob = create_user(&db, "uuid-b", "bob@example.com").await;

        for (uuid, key, owner) in [("app-1", "k1", alice), ("app-2", "k2", bob), ("app-3", "k3", alice)] {
            db.applications()
                .create(&NewApplication {
                    uuid,
                    name: "App",
                    api_key: key,
                    user_id: owner,
                    organization_id: None,
                })
                .await
                .unwrap();
        }

        assert_eq!(db.applications().count(None).await.unwrap(), 3);
        assert_eq!(db.applications().count(Some(alice)).await.unwrap(), 2);

        let apps = db.applications().list(Some(bob), 10, 0).await.unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].uuid, "app-2");
        assert_eq!(apps[0].owner_uuid, "uuid-b");
    }

    #[tokio::test]
    async fn test_set_api_key() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = create_user(&db, "uuid-a", "alice@example.com").await;
        let id = db
            .applications()
            .create(&NewApplication {
                uuid: "app-1",
                name: "App",
                api_key: "old-key",
                user_id: alice,
                organization_id: None,
            })
            .await
            .unwrap();

        db.applications().set_api_key(id, "new-key").await.unwrap();

        assert!(db.applications().get_by_api_key("old-key").await.unwrap().is_none());
        let app = db.applications().get_by_api_key("new-key").await.unwrap().unwrap();
        assert_eq!(app.uuid, "app-1");
    }
}
