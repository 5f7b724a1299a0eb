use crate::domain::models::PostRow;
use crate::domain::{BandRole, EntityKind, EntityRef, Post};
use crate::error::{SocialError, SocialResult};
use crate::repository::bands::member_role;
use crate::repository::entity_exists;
use crate::services::transaction::TransactionCoordinator;
use crate::validation::CreatePostRequest;
use resilience::Deadline;
use sqlx::PgConnection;
use tracing::info;
use uuid::Uuid;

/// Repository for posts
///
/// Deleting a post cascades its likes and reposts at the store.
#[derive(Clone)]
pub struct PostRepository {
    coordinator: TransactionCoordinator,
}

impl PostRepository {
    pub fn new(coordinator: TransactionCoordinator) -> Self {
        Self { coordinator }
    }

    /// Users post as themselves; band posts require the actor to be a member
    pub async fn create(
        &self,
        actor_id: Uuid,
        author: EntityRef,
        request: CreatePostRequest,
        deadline: Deadline,
    ) -> SocialResult<Post> {
        if author.kind == EntityKind::User && author.id != actor_id {
            return Err(SocialError::BusinessRule(
                "cannot post on behalf of another user".to_string(),
            ));
        }

        let post = self
            .coordinator
            .run_atomic(deadline, "create_post", move |tx| {
                Box::pin(insert_post(&mut **tx, actor_id, author, request))
            })
            .await?;

        info!(post_id = %post.id, author = %post.author, "post created");
        Ok(post)
    }

    /// Author, or an admin of the authoring band, may delete
    pub async fn delete(&self, actor_id: Uuid, post_id: Uuid, deadline: Deadline) -> SocialResult<()> {
        self.coordinator
            .run_atomic(deadline, "delete_post", move |tx| {
                Box::pin(delete_post(&mut **tx, actor_id, post_id))
            })
            .await?;

        info!(post_id = %post_id, actor_id = %actor_id, "post deleted");
        Ok(())
    }
}

async fn insert_post(
    conn: &mut PgConnection,
    actor_id: Uuid,
    author: EntityRef,
    request: CreatePostRequest,
) -> SocialResult<Post> {
    if author.kind == EntityKind::Band {
        if !entity_exists(&mut *conn, author).await? {
            return Err(SocialError::not_found("band", author.id));
        }
        if member_role(&mut *conn, author.id, actor_id).await?.is_none() {
            return Err(SocialError::BusinessRule(
                "only band members can post as the band".to_string(),
            ));
        }
    }

    let (user_id, band_id) = author.to_columns();
    let row: PostRow = sqlx::query_as(
        r#"
        INSERT INTO posts (id, author_kind, user_id, band_id, content, media_urls,
                           created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
        RETURNING id, author_kind, user_id, band_id, content, media_urls, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(author.kind.as_str())
    .bind(user_id)
    .bind(band_id)
    .bind(&request.content)
    .bind(&request.media_urls)
    .fetch_one(&mut *conn)
    .await?;

    Post::try_from(row)
}

async fn delete_post(conn: &mut PgConnection, actor_id: Uuid, post_id: Uuid) -> SocialResult<()> {
    let row: Option<PostRow> = sqlx::query_as(
        r#"
        SELECT id, author_kind, user_id, band_id, content, media_urls, created_at, updated_at
        FROM posts
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(post_id)
    .fetch_optional(&mut *conn)
    .await?;
    let post = Post::try_from(row.ok_or_else(|| SocialError::not_found("post", post_id))?)?;

    let allowed = match post.author.kind {
        EntityKind::User => post.author.id == actor_id,
        EntityKind::Band => {
            member_role(&mut *conn, post.author.id, actor_id).await? == Some(BandRole::Admin)
        }
    };
    if !allowed {
        return Err(SocialError::BusinessRule(
            "only the author can delete this post".to_string(),
        ));
    }

    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(post_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
