use crate::domain::{EdgeChange, EntityKind, EntityRef, FollowEdge, FollowStats};
use crate::domain::models::FollowRow;
use crate::error::{SocialError, SocialResult};
use crate::repository::entity_exists;
use crate::services::transaction::TransactionCoordinator;
use resilience::{with_deadline, Deadline};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

/// Directed follow edges from users to users or bands
///
/// Uniqueness of `(follower, kind, target)` is enforced by the store, so
/// follow/unfollow are idempotent without application-side locking.
#[derive(Clone)]
pub struct SocialGraph {
    pool: PgPool,
    coordinator: TransactionCoordinator,
}

impl SocialGraph {
    pub fn new(pool: PgPool, coordinator: TransactionCoordinator) -> Self {
        Self { pool, coordinator }
    }

    /// Idempotent follow; a repeated call reports `AlreadyPresent`
    pub async fn follow(
        &self,
        follower_id: Uuid,
        target: EntityRef,
        deadline: Deadline,
    ) -> SocialResult<EdgeChange> {
        let change = self
            .coordinator
            .run_atomic(deadline, "follow", move |tx| {
                Box::pin(insert_follow(&mut **tx, follower_id, target))
            })
            .await?;

        info!(
            follower_id = %follower_id,
            target = %target,
            created = change == EdgeChange::Created,
            "follow applied"
        );
        Ok(change)
    }

    /// Idempotent unfollow; returns true if an edge was removed
    pub async fn unfollow(
        &self,
        follower_id: Uuid,
        target: EntityRef,
        deadline: Deadline,
    ) -> SocialResult<bool> {
        let affected = with_deadline(
            deadline,
            "unfollow",
            sqlx::query(
                r#"
                DELETE FROM follows
                WHERE follower_id = $1 AND following_kind = $2 AND following_id = $3
                "#,
            )
            .bind(follower_id)
            .bind(target.kind.as_str())
            .bind(target.id)
            .execute(&self.pool),
        )
        .await??
        .rows_affected();

        info!(follower_id = %follower_id, target = %target, removed = affected > 0, "unfollow applied");
        Ok(affected > 0)
    }

    pub async fn is_following(
        &self,
        follower_id: Uuid,
        target: EntityRef,
        deadline: Deadline,
    ) -> SocialResult<bool> {
        let exists: bool = with_deadline(
            deadline,
            "is_following",
            sqlx::query_scalar(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM follows
                    WHERE follower_id = $1 AND following_kind = $2 AND following_id = $3
                )
                "#,
            )
            .bind(follower_id)
            .bind(target.kind.as_str())
            .bind(target.id)
            .fetch_one(&self.pool),
        )
        .await??;

        Ok(exists)
    }

    /// Followers of a user or band, most recent first
    pub async fn list_followers(
        &self,
        target: EntityRef,
        limit: i64,
        offset: i64,
        deadline: Deadline,
    ) -> SocialResult<Vec<FollowEdge>> {
        let rows = with_deadline(
            deadline,
            "list_followers",
            sqlx::query_as::<_, FollowRow>(
                r#"
                SELECT follower_id, following_kind, following_id, created_at
                FROM follows
                WHERE following_kind = $1 AND following_id = $2
                ORDER BY created_at DESC, follower_id DESC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(target.kind.as_str())
            .bind(target.id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool),
        )
        .await??;

        rows.into_iter().map(FollowEdge::try_from).collect()
    }

    /// Users followed by `follower_id`, most recent first
    pub async fn list_following(
        &self,
        follower_id: Uuid,
        limit: i64,
        offset: i64,
        deadline: Deadline,
    ) -> SocialResult<Vec<FollowEdge>> {
        self.list_following_kind(follower_id, EntityKind::User, limit, offset, deadline)
            .await
    }

    /// Bands followed by `follower_id`, most recent first
    pub async fn list_following_bands(
        &self,
        follower_id: Uuid,
        limit: i64,
        offset: i64,
        deadline: Deadline,
    ) -> SocialResult<Vec<FollowEdge>> {
        self.list_following_kind(follower_id, EntityKind::Band, limit, offset, deadline)
            .await
    }

    async fn list_following_kind(
        &self,
        follower_id: Uuid,
        kind: EntityKind,
        limit: i64,
        offset: i64,
        deadline: Deadline,
    ) -> SocialResult<Vec<FollowEdge>> {
        let rows = with_deadline(
            deadline,
            "list_following",
            sqlx::query_as::<_, FollowRow>(
                r#"
                SELECT follower_id, following_kind, following_id, created_at
                FROM follows
                WHERE follower_id = $1 AND following_kind = $2
                ORDER BY created_at DESC, following_id DESC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(follower_id)
            .bind(kind.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool),
        )
        .await??;

        rows.into_iter().map(FollowEdge::try_from).collect()
    }

    /// Follower and following totals read from one snapshot
    pub async fn follow_stats(
        &self,
        entity: EntityRef,
        deadline: Deadline,
    ) -> SocialResult<FollowStats> {
        self.coordinator
            .run_read_only(deadline, "follow_stats", move |tx| {
                Box::pin(load_follow_stats(&mut **tx, entity))
            })
            .await
    }
}

async fn insert_follow(
    conn: &mut PgConnection,
    follower_id: Uuid,
    target: EntityRef,
) -> SocialResult<EdgeChange> {
    if !entity_exists(&mut *conn, target).await? {
        return Err(SocialError::not_found(target.kind.as_str(), target.id));
    }

    let inserted = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO follows (follower_id, following_kind, following_id, created_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (follower_id, following_kind, following_id) DO NOTHING
        RETURNING follower_id
        "#,
    )
    .bind(follower_id)
    .bind(target.kind.as_str())
    .bind(target.id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(EdgeChange::from_inserted(inserted.is_some()))
}

async fn load_follow_stats(conn: &mut PgConnection, entity: EntityRef) -> SocialResult<FollowStats> {
    if !entity_exists(&mut *conn, entity).await? {
        return Err(SocialError::not_found(entity.kind.as_str(), entity.id));
    }

    let followers_count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM follows
        WHERE following_kind = $1 AND following_id = $2
        "#,
    )
    .bind(entity.kind.as_str())
    .bind(entity.id)
    .fetch_one(&mut *conn)
    .await?;

    let following_count: i64 = match entity.kind {
        EntityKind::User => {
            sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE follower_id = $1")
                .bind(entity.id)
                .fetch_one(&mut *conn)
                .await?
        }
        EntityKind::Band => 0,
    };

    Ok(FollowStats {
        followers_count,
        following_count,
    })
}
