use crate::db::models::User;
use crate::db::operations::DbOperations;
use crate::error::AppError;
use chrono::Utc;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, name, email, password_hash, google_id, avatar, phone, role, is_active, \
     refresh_token, stripe_customer_id, subscription_status, created_at, updated_at";

impl DbOperations {
    pub async fn create_user(&self, user: &User) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (id, name, email, password_hash, google_id, avatar, phone, role, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.google_id)
            .bind(&user.avatar)
            .bind(&user.phone)
            .bind(&user.role)
            .bind(user.is_active)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE google_id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(google_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    pub async fn link_google_account(
        &self,
        user_id: Uuid,
        google_id: &str,
        avatar: Option<&str>,
    ) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users SET google_id = $2, avatar = COALESCE(avatar, $3), updated_at = $4 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(google_id)
            .bind(avatar)
            .bind(Utc::now())
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    /// Stores the (already encrypted) refresh token; `None` revokes it.
    pub async fn set_refresh_token(
        &self,
        user_id: Uuid,
        encrypted_token: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET refresh_token = $2 WHERE id = $1")
            .bind(user_id)
            .bind(encrypted_token)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    pub async fn update_user_profile(
        &self,
        user_id: Uuid,
        name: Option<&str>,
        phone: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users SET name = COALESCE($2, name), phone = COALESCE($3, phone), \
             avatar = COALESCE($4, avatar), updated_at = $5 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(name)
            .bind(phone)
            .bind(avatar)
            .bind(Utc::now())
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        Ok(user)
    }

    pub async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .bind(Utc::now())
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    pub async fn list_users(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), AppError> {
        let pattern = search.map(|s| format!("%{}%", s.trim()));

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE ($1::text IS NULL OR name ILIKE $1 OR email ILIKE $1)",
        )
        .bind(&pattern)
        .fetch_one(self.pool.as_ref())
        .await?;

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE ($1::text IS NULL OR name ILIKE $1 OR email ILIKE $1) \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(&pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok((users, total))
    }

    pub async fn set_user_role(&self, user_id: Uuid, role: &str) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users SET role = $2, updated_at = $3 WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(role)
            .bind(Utc::now())
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    /// Deactivation also revokes the stored refresh token.
    pub async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users SET is_active = $2, \
             refresh_token = CASE WHEN $2 THEN refresh_token ELSE NULL END, updated_at = $3 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(is_active)
            .bind(Utc::now())
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    pub async fn delete_user(&self, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_subscription(
        &self,
        user_id: Uuid,
        status: &str,
        stripe_customer_id: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET subscription_status = $2, \
             stripe_customer_id = COALESCE($3, stripe_customer_id), updated_at = $4 WHERE id = $1",
        )
        .bind(user_id)
        .bind(status)
        .bind(stripe_customer_id)
        .bind(Utc::now())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    pub async fn set_subscription_by_customer(
        &self,
        stripe_customer_id: &str,
        status: &str,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE users SET subscription_status = $2, updated_at = $3 WHERE stripe_customer_id = $1",
        )
        .bind(stripe_customer_id)
        .bind(status)
        .bind(Utc::now())
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }
}
