use super::entity::{EntityKind, EntityRef, GeoPoint};
use crate::error::{SocialError, SocialResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = SocialError;

    fn try_from(row: UserRow) -> SocialResult<Self> {
        Ok(Self {
            location: GeoPoint::from_columns(row.latitude, row.longitude)?,
            id: row.id,
            username: row.username,
            email: row.email,
            display_name: row.display_name,
            bio: row.bio,
            profile_picture_url: row.profile_picture_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Band entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Band {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub profile_picture_url: Option<String>,
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BandRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub profile_picture_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BandRow> for Band {
    type Error = SocialError;

    fn try_from(row: BandRow) -> SocialResult<Self> {
        Ok(Self {
            location: GeoPoint::from_columns(row.latitude, row.longitude)?,
            id: row.id,
            name: row.name,
            description: row.description,
            genre: row.genre,
            profile_picture_url: row.profile_picture_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Role of a user inside a band; anything beyond admin/member is free text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandRole {
    Admin,
    Member,
    Other(String),
}

impl BandRole {
    pub fn as_str(&self) -> &str {
        match self {
            BandRole::Admin => "admin",
            BandRole::Member => "member",
            BandRole::Other(role) => role.as_str(),
        }
    }

    pub fn parse(role: &str) -> Self {
        match role {
            "admin" => BandRole::Admin,
            "member" => BandRole::Member,
            other => BandRole::Other(other.to_string()),
        }
    }
}

/// Band membership row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandMember {
    pub band_id: Uuid,
    pub user_id: Uuid,
    pub role: BandRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BandMemberRow {
    pub band_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

impl From<BandMemberRow> for BandMember {
    fn from(row: BandMemberRow) -> Self {
        Self {
            band_id: row.band_id,
            user_id: row.user_id,
            role: BandRole::parse(&row.role),
            joined_at: row.joined_at,
        }
    }
}

/// Post entity; author and kind are fixed at creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author: EntityRef,
    pub content: String,
    pub media_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: Uuid,
    pub author_kind: String,
    pub user_id: Option<Uuid>,
    pub band_id: Option<Uuid>,
    pub content: String,
    pub media_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PostRow> for Post {
    type Error = SocialError;

    fn try_from(row: PostRow) -> SocialResult<Self> {
        Ok(Self {
            author: EntityRef::from_columns(&row.author_kind, row.user_id, row.band_id)?,
            id: row.id,
            content: row.content,
            media_urls: row.media_urls,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Post statistics aggregated from likes and reposts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementCounts {
    pub likes_count: i64,
    pub reposts_count: i64,
}

/// Post enriched for a feed page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPost {
    #[serde(flatten)]
    pub post: Post,
    pub likes_count: i64,
    pub reposts_count: i64,
    /// Always false for anonymous viewers
    pub is_liked: bool,
    /// Always false for anonymous viewers
    pub is_reposted: bool,
}

/// Proximity search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyEntity {
    pub entity: EntityRef,
    pub name: String,
    pub profile_picture_url: Option<String>,
    pub location: GeoPoint,
    pub distance_meters: f64,
}

/// Directed follow edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEdge {
    pub follower_id: Uuid,
    pub following: EntityRef,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FollowRow {
    pub follower_id: Uuid,
    pub following_kind: String,
    pub following_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<FollowRow> for FollowEdge {
    type Error = SocialError;

    fn try_from(row: FollowRow) -> SocialResult<Self> {
        let kind: EntityKind = row.following_kind.parse()?;
        Ok(Self {
            follower_id: row.follower_id,
            following: EntityRef {
                kind,
                id: row.following_id,
            },
            created_at: row.created_at,
        })
    }
}

/// Follower/following totals for one entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowStats {
    pub followers_count: i64,
    /// Bands never follow; always zero for them
    pub following_count: i64,
}

/// Whether an idempotent write changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeChange {
    Created,
    AlreadyPresent,
}

impl EdgeChange {
    pub(crate) fn from_inserted(inserted: bool) -> Self {
        if inserted {
            EdgeChange::Created
        } else {
            EdgeChange::AlreadyPresent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_role_parsing() {
        assert_eq!(BandRole::parse("admin"), BandRole::Admin);
        assert_eq!(BandRole::parse("member"), BandRole::Member);
        assert_eq!(
            BandRole::parse("drummer"),
            BandRole::Other("drummer".to_string())
        );
        assert_eq!(BandRole::Other("drummer".into()).as_str(), "drummer");
    }

    #[test]
    fn test_post_row_conversion_enforces_author_invariant() {
        let now = Utc::now();
        let band_id = Uuid::new_v4();
        let row = PostRow {
            id: Uuid::new_v4(),
            author_kind: "band".into(),
            user_id: None,
            band_id: Some(band_id),
            content: "new single out friday".into(),
            media_urls: vec!["https://cdn.example/cover.png".into()],
            created_at: now,
            updated_at: now,
        };
        let post = Post::try_from(row).unwrap();
        assert_eq!(post.author, EntityRef::band(band_id));
        assert_eq!(post.media_urls.len(), 1);

        let broken = PostRow {
            id: Uuid::new_v4(),
            author_kind: "user".into(),
            user_id: None,
            band_id: Some(band_id),
            content: String::new(),
            media_urls: vec![],
            created_at: now,
            updated_at: now,
        };
        assert!(Post::try_from(broken).is_err());
    }

    #[test]
    fn test_feed_post_serializes_flat() {
        let now = Utc::now();
        let feed_post = FeedPost {
            post: Post {
                id: Uuid::nil(),
                author: EntityRef::user(Uuid::nil()),
                content: "hello".into(),
                media_urls: vec![],
                created_at: now,
                updated_at: now,
            },
            likes_count: 3,
            reposts_count: 1,
            is_liked: true,
            is_reposted: false,
        };
        let value = serde_json::to_value(&feed_post).unwrap();
        assert_eq!(value["content"], "hello");
        assert_eq!(value["likes_count"], 3);
        assert_eq!(value["author"]["kind"], "user");
    }
}
