//! Feed composition
//!
//! A page is read inside one read-only snapshot: the post window, the
//! engagement counts and the viewer flags all see the same data.

use crate::domain::models::PostRow;
use crate::domain::{EngagementCounts, FeedPost, Post};
use crate::error::{SocialError, SocialResult};
use crate::services::engagement::{engaged_among, load_counts, Engagement};
use crate::services::transaction::TransactionCoordinator;
use resilience::Deadline;
use sqlx::PgConnection;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

/// Which posts are candidates for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedScope {
    /// Posts by users and bands the viewer follows
    Following(Uuid),
    /// Every post
    Explore,
}

impl FeedScope {
    fn as_str(&self) -> &'static str {
        match self {
            FeedScope::Following(_) => "following",
            FeedScope::Explore => "explore",
        }
    }
}

/// Builds ordered, enriched post pages
#[derive(Clone)]
pub struct FeedComposer {
    coordinator: TransactionCoordinator,
}

impl FeedComposer {
    pub fn new(coordinator: TransactionCoordinator) -> Self {
        Self { coordinator }
    }

    /// Home feed; anonymous viewers fall back to the explore feed
    pub async fn get_feed(
        &self,
        viewer: Option<Uuid>,
        limit: i64,
        offset: i64,
        deadline: Deadline,
    ) -> SocialResult<Vec<FeedPost>> {
        let scope = match viewer {
            Some(viewer_id) => FeedScope::Following(viewer_id),
            None => FeedScope::Explore,
        };
        self.compose(scope, viewer, limit, offset, deadline).await
    }

    /// Global feed; viewer flags are filled in when the viewer is known
    pub async fn get_explore_feed(
        &self,
        viewer: Option<Uuid>,
        limit: i64,
        offset: i64,
        deadline: Deadline,
    ) -> SocialResult<Vec<FeedPost>> {
        self.compose(FeedScope::Explore, viewer, limit, offset, deadline)
            .await
    }

    /// Newest first, ties broken by post id descending
    ///
    /// `limit` and `offset` are expected to be validated by the caller.
    pub async fn compose(
        &self,
        scope: FeedScope,
        viewer: Option<Uuid>,
        limit: i64,
        offset: i64,
        deadline: Deadline,
    ) -> SocialResult<Vec<FeedPost>> {
        let page = self
            .coordinator
            .run_read_only(deadline, "get_feed", move |tx| {
                Box::pin(load_page(&mut **tx, scope, viewer, limit, offset))
            })
            .await?;

        debug!(scope = scope.as_str(), limit, offset, returned = page.len(), "feed page composed");
        Ok(page)
    }

    /// Single post with counts and viewer flags from one snapshot
    pub async fn get_post(
        &self,
        post_id: Uuid,
        viewer: Option<Uuid>,
        deadline: Deadline,
    ) -> SocialResult<FeedPost> {
        self.coordinator
            .run_read_only(deadline, "get_post", move |tx| {
                Box::pin(load_post(&mut **tx, post_id, viewer))
            })
            .await
    }
}

async fn load_page(
    conn: &mut PgConnection,
    scope: FeedScope,
    viewer: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> SocialResult<Vec<FeedPost>> {
    let rows: Vec<PostRow> = match scope {
        FeedScope::Following(viewer_id) => {
            sqlx::query_as(
                r#"
                SELECT p.id, p.author_kind, p.user_id, p.band_id, p.content, p.media_urls,
                       p.created_at, p.updated_at
                FROM posts p
                WHERE EXISTS (
                    SELECT 1 FROM follows f
                    WHERE f.follower_id = $1
                      AND (
                          (f.following_kind = 'user' AND f.following_id = p.user_id)
                          OR (f.following_kind = 'band' AND f.following_id = p.band_id)
                      )
                )
                ORDER BY p.created_at DESC, p.id DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(viewer_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?
        }
        FeedScope::Explore => {
            sqlx::query_as(
                r#"
                SELECT id, author_kind, user_id, band_id, content, media_urls,
                       created_at, updated_at
                FROM posts
                ORDER BY created_at DESC, id DESC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?
        }
    };

    let posts = rows
        .into_iter()
        .map(Post::try_from)
        .collect::<SocialResult<Vec<_>>>()?;

    enrich(conn, posts, viewer).await
}

async fn load_post(
    conn: &mut PgConnection,
    post_id: Uuid,
    viewer: Option<Uuid>,
) -> SocialResult<FeedPost> {
    let row: Option<PostRow> = sqlx::query_as(
        r#"
        SELECT id, author_kind, user_id, band_id, content, media_urls, created_at, updated_at
        FROM posts
        WHERE id = $1
        "#,
    )
    .bind(post_id)
    .fetch_optional(&mut *conn)
    .await?;

    let post = Post::try_from(row.ok_or_else(|| SocialError::not_found("post", post_id))?)?;
    let mut enriched = enrich(conn, vec![post], viewer).await?;
    enriched
        .pop()
        .ok_or_else(|| SocialError::Internal("enrichment dropped the post".to_string()))
}

async fn enrich(
    conn: &mut PgConnection,
    posts: Vec<Post>,
    viewer: Option<Uuid>,
) -> SocialResult<Vec<FeedPost>> {
    let ids: Vec<Uuid> = posts.iter().map(|post| post.id).collect();
    let counts = load_counts(&mut *conn, &ids).await?;

    let (liked, reposted) = match viewer {
        Some(viewer_id) => (
            engaged_among(&mut *conn, Engagement::Like, viewer_id, &ids).await?,
            engaged_among(&mut *conn, Engagement::Repost, viewer_id, &ids).await?,
        ),
        None => (HashSet::new(), HashSet::new()),
    };

    Ok(assemble_feed(posts, &counts, &liked, &reposted))
}

/// Attach counts and viewer flags, keeping the order of `posts`
pub fn assemble_feed(
    posts: Vec<Post>,
    counts: &HashMap<Uuid, EngagementCounts>,
    liked: &HashSet<Uuid>,
    reposted: &HashSet<Uuid>,
) -> Vec<FeedPost> {
    posts
        .into_iter()
        .map(|post| {
            let EngagementCounts {
                likes_count,
                reposts_count,
            } = counts.get(&post.id).copied().unwrap_or_default();
            FeedPost {
                is_liked: liked.contains(&post.id),
                is_reposted: reposted.contains(&post.id),
                likes_count,
                reposts_count,
                post,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityRef;
    use chrono::{Duration, TimeZone, Utc};

    fn post_at(author: EntityRef, minute: i64) -> Post {
        let created_at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minute);
        Post {
            id: Uuid::new_v4(),
            author,
            content: format!("post at {}", minute),
            media_urls: vec![],
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_assemble_keeps_order_and_counts() {
        let band = EntityRef::band(Uuid::new_v4());
        let user = EntityRef::user(Uuid::new_v4());
        let newer = post_at(band, 20);
        let older = post_at(user, 10);

        let mut counts = HashMap::new();
        counts.insert(
            newer.id,
            EngagementCounts {
                likes_count: 4,
                reposts_count: 2,
            },
        );
        let liked: HashSet<Uuid> = [older.id].into_iter().collect();
        let reposted = HashSet::new();

        let page = assemble_feed(vec![newer.clone(), older.clone()], &counts, &liked, &reposted);

        assert_eq!(page.len(), 2);
        assert_eq!(page[0].post.id, newer.id);
        assert_eq!(page[0].post.author, band);
        assert_eq!((page[0].likes_count, page[0].reposts_count), (4, 2));
        assert!(!page[0].is_liked);

        assert_eq!(page[1].post.id, older.id);
        assert_eq!((page[1].likes_count, page[1].reposts_count), (0, 0));
        assert!(page[1].is_liked);
        assert!(!page[1].is_reposted);
    }

    #[test]
    fn test_anonymous_page_has_no_viewer_flags() {
        let post = post_at(EntityRef::user(Uuid::new_v4()), 0);
        let page = assemble_feed(vec![post], &HashMap::new(), &HashSet::new(), &HashSet::new());
        assert!(!page[0].is_liked);
        assert!(!page[0].is_reposted);
    }

    #[test]
    fn test_scope_labels() {
        assert_eq!(FeedScope::Following(Uuid::nil()).as_str(), "following");
        assert_eq!(FeedScope::Explore.as_str(), "explore");
    }
}
