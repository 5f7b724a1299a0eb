use crate::domain::{EdgeChange, EngagementCounts};
use crate::error::SocialResult;
use resilience::{with_deadline, Deadline};
use sqlx::{PgExecutor, PgPool};
use std::collections::{HashMap, HashSet};
use tracing::info;
use uuid::Uuid;

/// Edge tables recording that a user engaged with a post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engagement {
    Like,
    Repost,
}

impl Engagement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engagement::Like => "like",
            Engagement::Repost => "repost",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            Engagement::Like => "likes",
            Engagement::Repost => "reposts",
        }
    }
}

/// Like and repost edges between users and posts
///
/// Counts are aggregated from the edge rows at read time; nothing keeps a
/// running counter.
#[derive(Clone)]
pub struct EngagementLedger {
    pool: PgPool,
}

impl EngagementLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent like; unknown user or post surfaces as `NotFound`
    pub async fn like(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        deadline: Deadline,
    ) -> SocialResult<EdgeChange> {
        self.record(Engagement::Like, user_id, post_id, deadline).await
    }

    /// Idempotent unlike; returns true if a like was removed
    pub async fn unlike(&self, user_id: Uuid, post_id: Uuid, deadline: Deadline) -> SocialResult<bool> {
        let affected = with_deadline(
            deadline,
            "unlike",
            sqlx::query("DELETE FROM likes WHERE user_id = $1 AND post_id = $2")
                .bind(user_id)
                .bind(post_id)
                .execute(&self.pool),
        )
        .await??
        .rows_affected();

        info!(user_id = %user_id, post_id = %post_id, removed = affected > 0, "unlike applied");
        Ok(affected > 0)
    }

    /// Idempotent repost
    pub async fn repost(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        deadline: Deadline,
    ) -> SocialResult<EdgeChange> {
        self.record(Engagement::Repost, user_id, post_id, deadline).await
    }

    pub async fn is_liked(&self, user_id: Uuid, post_id: Uuid, deadline: Deadline) -> SocialResult<bool> {
        self.exists(Engagement::Like, user_id, post_id, deadline).await
    }

    pub async fn is_reposted(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        deadline: Deadline,
    ) -> SocialResult<bool> {
        self.exists(Engagement::Repost, user_id, post_id, deadline).await
    }

    /// Like and repost totals for one post
    pub async fn counts(&self, post_id: Uuid, deadline: Deadline) -> SocialResult<EngagementCounts> {
        let mut counts = with_deadline(deadline, "engagement_counts", load_counts(&self.pool, &[post_id]))
            .await??;
        Ok(counts.remove(&post_id).unwrap_or_default())
    }

    async fn record(
        &self,
        engagement: Engagement,
        user_id: Uuid,
        post_id: Uuid,
        deadline: Deadline,
    ) -> SocialResult<EdgeChange> {
        let sql = format!(
            r#"
            INSERT INTO {} (user_id, post_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id, post_id) DO NOTHING
            RETURNING post_id
            "#,
            engagement.table()
        );

        let inserted = with_deadline(
            deadline,
            engagement.as_str(),
            sqlx::query_scalar::<_, Uuid>(&sql)
                .bind(user_id)
                .bind(post_id)
                .fetch_optional(&self.pool),
        )
        .await??;

        let change = EdgeChange::from_inserted(inserted.is_some());
        info!(
            user_id = %user_id,
            post_id = %post_id,
            engagement = engagement.as_str(),
            created = change == EdgeChange::Created,
            "engagement recorded"
        );
        Ok(change)
    }

    async fn exists(
        &self,
        engagement: Engagement,
        user_id: Uuid,
        post_id: Uuid,
        deadline: Deadline,
    ) -> SocialResult<bool> {
        let found = with_deadline(
            deadline,
            "engagement_lookup",
            engaged_among(&self.pool, engagement, user_id, &[post_id]),
        )
        .await??;
        Ok(found.contains(&post_id))
    }
}

/// Counts for every id in `post_ids`; ids without edges map to zero counts
pub(crate) async fn load_counts<'e, E>(
    executor: E,
    post_ids: &[Uuid],
) -> SocialResult<HashMap<Uuid, EngagementCounts>>
where
    E: PgExecutor<'e>,
{
    if post_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Uuid, i64, i64)> = sqlx::query_as(
        r#"
        SELECT p.id,
               (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS likes_count,
               (SELECT COUNT(*) FROM reposts r WHERE r.post_id = p.id) AS reposts_count
        FROM UNNEST($1::uuid[]) AS p(id)
        "#,
    )
    .bind(post_ids)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, likes_count, reposts_count)| {
            (
                id,
                EngagementCounts {
                    likes_count,
                    reposts_count,
                },
            )
        })
        .collect())
}

/// Subset of `post_ids` the user has liked or reposted
pub(crate) async fn engaged_among<'e, E>(
    executor: E,
    engagement: Engagement,
    user_id: Uuid,
    post_ids: &[Uuid],
) -> SocialResult<HashSet<Uuid>>
where
    E: PgExecutor<'e>,
{
    if post_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let sql = format!(
        "SELECT post_id FROM {} WHERE user_id = $1 AND post_id = ANY($2)",
        engagement.table()
    );
    let ids: Vec<Uuid> = sqlx::query_scalar(&sql)
        .bind(user_id)
        .bind(post_ids)
        .fetch_all(executor)
        .await?;

    Ok(ids.into_iter().collect())
}
