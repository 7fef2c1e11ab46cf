use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    Manager,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Manager => "MANAGER",
            UserRole::User => "USER",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "ADMIN" => UserRole::Admin,
            "MANAGER" => UserRole::Manager,
            _ => UserRole::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub role: UserRole,
    pub provider: String,
    pub provider_id: Option<String>,
    pub photo: Option<String>,
    pub extra_user_data: Option<serde_json::Value>,
    pub created_at: String,
}

/// Fields required to insert a user.
pub struct NewUser<'a> {
    pub uuid: &'a str,
    pub email: &'a str,
    pub name: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub role: UserRole,
    pub provider: &'a str,
    pub provider_id: Option<&'a str>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    email: String,
    name: Option<String>,
    password_hash: Option<String>,
    role: String,
    provider: String,
    provider_id: Option<String>,
    photo: Option<String>,
    extra_user_data: Option<String>,
    created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            role: UserRole::from_str(&row.role),
            provider: row.provider,
            provider_id: row.provider_id,
            photo: row.photo,
            extra_user_data: row
                .extra_user_data
                .and_then(|raw| serde_json::from_str(&raw).ok()),
            created_at: row.created_at,
        }
    }
}

/// Public user representation. Does not expose internal database IDs or password hashes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub provider: String,
    pub provider_id: Option<String>,
    pub photo: Option<String>,
    pub extra_user_data: Option<serde_json::Value>,
    pub created_at: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.uuid,
            email: user.email,
            name: user.name,
            role: user.role,
            provider: user.provider,
            provider_id: user.provider_id,
            photo: user.photo,
            extra_user_data: user.extra_user_data,
            created_at: user.created_at,
        }
    }
}

/// Builds a static `SELECT` over all user columns followed by the given clause.
macro_rules! select_users {
    ($tail:literal) => {
        concat!(
            "SELECT id, uuid, email, name, password_hash, role, provider, provider_id, photo, extra_user_data, created_at FROM users ",
            $tail
        )
    };
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user. Returns the user ID.
    pub async fn create(&self, user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, email, name, password_hash, role, provider, provider_id) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.uuid)
        .bind(user.email)
        .bind(user.name)
        .bind(user.password_hash)
        .bind(user.role.as_str())
        .bind(user.provider)
        .bind(user.provider_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(select_users!("WHERE email = ?"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(select_users!("WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(select_users!("WHERE uuid = ?"))
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Update profile fields. `None` leaves a field unchanged.
    pub async fn update_profile(
        &self,
        id: i64,
        name: Option<&str>,
        photo: Option<&str>,
        extra_user_data: Option<&serde_json::Value>,
    ) -> Result<bool, sqlx::Error> {
        let extra = extra_user_data.map(|v| v.to_string());
        let result = sqlx::query(
            "UPDATE users SET name = COALESCE(?, name), photo = COALESCE(?, photo), extra_user_data = COALESCE(?, extra_user_data) WHERE id = ?",
        )
        .bind(name)
        .bind(photo)
        .bind(extra)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the password hash for a user.
    pub async fn set_password_hash(&self, id: i64, hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the role for a user.
    pub async fn set_role(&self, id: i64, role: UserRole) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user by ID.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// List users ordered by creation.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> =
            sqlx::query_as(select_users!("ORDER BY created_at, id LIMIT ? OFFSET ?"))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}
