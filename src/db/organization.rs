use serde::Serialize;
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct OrganizationStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Organization {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Public organization representation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSummary {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Organization> for OrganizationSummary {
    fn from(org: Organization) -> Self {
        Self {
            id: org.uuid,
            name: org.name,
            created_at: org.created_at,
            updated_at: org.updated_at,
        }
    }
}

impl OrganizationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, uuid: &str, name: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO organizations (uuid, name) VALUES (?, ?)")
            .bind(uuid)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Organization>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, uuid, name, created_at, updated_at FROM organizations WHERE uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn rename(&self, id: i64, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE organizations SET name = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(name)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete an organization. Its applications are detached, not deleted.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM organizations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Organization>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, uuid, name, created_at, updated_at FROM organizations ORDER BY created_at, id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, NewApplication, NewUser, UserRole};

    #[tokio::test]
    async fn test_create_rename_delete() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db.organizations().create("org-1", "Acme").await.unwrap();
        assert!(db.organizations().rename(id, "Acme Corp").await.unwrap());

        let org = db.organizations().get_by_uuid("org-1").await.unwrap().unwrap();
        assert_eq!(org.name, "Acme Corp");

        assert!(db.organizations().delete(id).await.unwrap());
        assert!(db.organizations().get_by_uuid("org-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_detaches_applications() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db
            .users()
            .create(&NewUser {
                uuid: "uuid-1",
                email: "alice@example.com",
                name: None,
                password_hash: None,
                role: UserRole::Manager,
                provider: "local",
                provider_id: None,
            })
            .await
            .unwrap();
        let org_id = db.organizations().create("org-1", "Acme").await.unwrap();
        db.applications()
            .create(&NewApplication {
                uuid: "app-1",
                name: "Portal",
                api_key: "key-1",
                user_id,
                organization_id: Some(org_id),
            })
            .await
            .unwrap();

        db.organizations().delete(org_id).await.unwrap();

        let app = db.applications().get_by_uuid("app-1").await.unwrap().unwrap();
        assert_eq!(app.organization_id, None);
        assert_eq!(app.organization_uuid, None);
    }
}
