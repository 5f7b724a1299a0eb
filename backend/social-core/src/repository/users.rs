use crate::domain::models::UserRow;
use crate::domain::{GeoPoint, User};
use crate::error::{SocialError, SocialResult};
use crate::validation::CreateUserRequest;
use resilience::{with_deadline, Deadline};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, display_name, bio, profile_picture_url, \
                            latitude, longitude, created_at, updated_at";

/// Repository for user profiles
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Duplicate username or email surfaces as `Conflict`
    pub async fn create(&self, request: &CreateUserRequest, deadline: Deadline) -> SocialResult<User> {
        let location = request.location()?;
        let sql = format!(
            r#"
            INSERT INTO users (id, username, email, display_name, bio, profile_picture_url,
                               latitude, longitude, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            RETURNING {USER_COLUMNS}
            "#
        );

        let row = with_deadline(
            deadline,
            "create_user",
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(Uuid::new_v4())
                .bind(&request.username)
                .bind(&request.email)
                .bind(&request.display_name)
                .bind(&request.bio)
                .bind(&request.profile_picture_url)
                .bind(location.map(|p| p.latitude()))
                .bind(location.map(|p| p.longitude()))
                .fetch_one(&self.pool),
        )
        .await??;

        let user = User::try_from(row)?;
        info!(user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub async fn get(&self, user_id: Uuid, deadline: Deadline) -> SocialResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = with_deadline(
            deadline,
            "get_user",
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await??
        .ok_or_else(|| SocialError::not_found("user", user_id))?;

        User::try_from(row)
    }

    /// Set or clear the stored point; `None` removes the user from proximity search
    pub async fn update_location(
        &self,
        user_id: Uuid,
        location: Option<GeoPoint>,
        deadline: Deadline,
    ) -> SocialResult<User> {
        let sql = format!(
            r#"
            UPDATE users
            SET latitude = $2, longitude = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );

        let row = with_deadline(
            deadline,
            "update_user_location",
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(user_id)
                .bind(location.map(|p| p.latitude()))
                .bind(location.map(|p| p.longitude()))
                .fetch_optional(&self.pool),
        )
        .await??
        .ok_or_else(|| SocialError::not_found("user", user_id))?;

        info!(user_id = %user_id, has_location = location.is_some(), "user location updated");
        User::try_from(row)
    }
}
