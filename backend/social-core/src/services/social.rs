//! Entry points for the request layer
//!
//! Writes take the acting user's id. Reads take an optional viewer; `None`
//! means an anonymous caller. Every call carries a `Deadline` and returns a
//! classified `SocialError` on failure. Inputs are validated here, so the
//! components below trust their arguments.

use crate::domain::{
    Band, BandMember, EdgeChange, EntityKind, EntityRef, FeedPost, FollowEdge, FollowStats,
    GeoPoint, NearbyEntity, Post, User,
};
use crate::error::{SocialError, SocialResult};
use crate::repository::{BandRepository, PostRepository, UserRepository};
use crate::services::engagement::EngagementLedger;
use crate::services::feed::FeedComposer;
use crate::services::geo::GeoProximityIndex;
use crate::services::graph::SocialGraph;
use crate::services::transaction::TransactionCoordinator;
use crate::validation::{
    ensure_not_self_follow, CreateBandRequest, CreatePostRequest, CreateUserRequest,
    NearbyRequest, PageRequest,
};
use resilience::Deadline;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct SocialCore {
    users: UserRepository,
    bands: BandRepository,
    posts: PostRepository,
    geo: GeoProximityIndex,
    graph: SocialGraph,
    engagement: EngagementLedger,
    feed: FeedComposer,
}

impl SocialCore {
    /// All components share `pool`
    pub fn new(pool: PgPool) -> Self {
        let coordinator = TransactionCoordinator::new(pool.clone());
        Self {
            users: UserRepository::new(pool.clone()),
            bands: BandRepository::new(pool.clone(), coordinator.clone()),
            posts: PostRepository::new(coordinator.clone()),
            geo: GeoProximityIndex::new(pool.clone()),
            graph: SocialGraph::new(pool.clone(), coordinator.clone()),
            engagement: EngagementLedger::new(pool),
            feed: FeedComposer::new(coordinator),
        }
    }

    pub fn graph(&self) -> &SocialGraph {
        &self.graph
    }

    pub fn engagement(&self) -> &EngagementLedger {
        &self.engagement
    }

    // ---- social graph ----

    pub async fn create_follow(
        &self,
        actor_id: Uuid,
        target: EntityRef,
        deadline: Deadline,
    ) -> SocialResult<EdgeChange> {
        ensure_not_self_follow(actor_id, target).inspect_err(SocialError::log)?;
        self.graph
            .follow(actor_id, target, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn remove_follow(
        &self,
        actor_id: Uuid,
        target: EntityRef,
        deadline: Deadline,
    ) -> SocialResult<bool> {
        self.graph
            .unfollow(actor_id, target, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn is_following(
        &self,
        follower_id: Uuid,
        target: EntityRef,
        deadline: Deadline,
    ) -> SocialResult<bool> {
        self.graph
            .is_following(follower_id, target, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn list_followers(
        &self,
        target: EntityRef,
        page: PageRequest,
        deadline: Deadline,
    ) -> SocialResult<Vec<FollowEdge>> {
        let page = page.checked()?;
        self.graph
            .list_followers(target, page.limit, page.offset, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    /// Users followed by `user_id`
    pub async fn list_following(
        &self,
        user_id: Uuid,
        page: PageRequest,
        deadline: Deadline,
    ) -> SocialResult<Vec<FollowEdge>> {
        let page = page.checked()?;
        self.graph
            .list_following(user_id, page.limit, page.offset, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn list_following_bands(
        &self,
        user_id: Uuid,
        page: PageRequest,
        deadline: Deadline,
    ) -> SocialResult<Vec<FollowEdge>> {
        let page = page.checked()?;
        self.graph
            .list_following_bands(user_id, page.limit, page.offset, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn follow_stats(
        &self,
        entity: EntityRef,
        deadline: Deadline,
    ) -> SocialResult<FollowStats> {
        self.graph
            .follow_stats(entity, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    // ---- feeds ----

    /// Followed authors for a known viewer, explore feed for anonymous ones
    pub async fn get_feed(
        &self,
        viewer: Option<Uuid>,
        page: PageRequest,
        deadline: Deadline,
    ) -> SocialResult<Vec<FeedPost>> {
        let page = page.checked()?;
        self.feed
            .get_feed(viewer, page.limit, page.offset, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn get_explore_feed(
        &self,
        viewer: Option<Uuid>,
        page: PageRequest,
        deadline: Deadline,
    ) -> SocialResult<Vec<FeedPost>> {
        let page = page.checked()?;
        self.feed
            .get_explore_feed(viewer, page.limit, page.offset, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    // ---- proximity ----

    pub async fn get_nearby_users(
        &self,
        request: &NearbyRequest,
        deadline: Deadline,
    ) -> SocialResult<Vec<NearbyEntity>> {
        self.nearby(EntityKind::User, request, deadline).await
    }

    pub async fn get_nearby_bands(
        &self,
        request: &NearbyRequest,
        deadline: Deadline,
    ) -> SocialResult<Vec<NearbyEntity>> {
        self.nearby(EntityKind::Band, request, deadline).await
    }

    async fn nearby(
        &self,
        kind: EntityKind,
        request: &NearbyRequest,
        deadline: Deadline,
    ) -> SocialResult<Vec<NearbyEntity>> {
        let center = request.center()?;
        self.geo
            .find_nearby(kind, center, request.radius_km, request.limit, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    // ---- engagement ----

    pub async fn like_post(
        &self,
        actor_id: Uuid,
        post_id: Uuid,
        deadline: Deadline,
    ) -> SocialResult<EdgeChange> {
        self.engagement
            .like(actor_id, post_id, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn unlike_post(
        &self,
        actor_id: Uuid,
        post_id: Uuid,
        deadline: Deadline,
    ) -> SocialResult<bool> {
        self.engagement
            .unlike(actor_id, post_id, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn repost(
        &self,
        actor_id: Uuid,
        post_id: Uuid,
        deadline: Deadline,
    ) -> SocialResult<EdgeChange> {
        self.engagement
            .repost(actor_id, post_id, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    // ---- bands ----

    /// Creator becomes the band's first admin in the same atomic unit
    pub async fn create_band(
        &self,
        actor_id: Uuid,
        request: CreateBandRequest,
        deadline: Deadline,
    ) -> SocialResult<Band> {
        request.validate()?;
        self.bands
            .create(actor_id, request, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn get_band(&self, band_id: Uuid, deadline: Deadline) -> SocialResult<Band> {
        self.bands
            .get(band_id, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn update_band_location(
        &self,
        actor_id: Uuid,
        band_id: Uuid,
        location: Option<GeoPoint>,
        deadline: Deadline,
    ) -> SocialResult<Band> {
        self.bands
            .update_location(actor_id, band_id, location, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn join_band(
        &self,
        actor_id: Uuid,
        band_id: Uuid,
        deadline: Deadline,
    ) -> SocialResult<BandMember> {
        self.bands
            .join(band_id, actor_id, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn leave_band(
        &self,
        actor_id: Uuid,
        band_id: Uuid,
        deadline: Deadline,
    ) -> SocialResult<()> {
        self.bands
            .leave(band_id, actor_id, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn list_band_members(
        &self,
        band_id: Uuid,
        page: PageRequest,
        deadline: Deadline,
    ) -> SocialResult<Vec<BandMember>> {
        let page = page.checked()?;
        self.bands
            .list_members(band_id, page.limit, page.offset, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    // ---- users ----

    pub async fn create_user(
        &self,
        request: CreateUserRequest,
        deadline: Deadline,
    ) -> SocialResult<User> {
        request.validate()?;
        self.users
            .create(&request, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn get_user(&self, user_id: Uuid, deadline: Deadline) -> SocialResult<User> {
        self.users
            .get(user_id, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    /// Users only move themselves
    pub async fn update_user_location(
        &self,
        actor_id: Uuid,
        location: Option<GeoPoint>,
        deadline: Deadline,
    ) -> SocialResult<User> {
        self.users
            .update_location(actor_id, location, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    // ---- posts ----

    pub async fn create_post(
        &self,
        actor_id: Uuid,
        author: EntityRef,
        request: CreatePostRequest,
        deadline: Deadline,
    ) -> SocialResult<Post> {
        request.validate()?;
        self.posts
            .create(actor_id, author, request, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    /// Post with counts, plus viewer flags when `viewer` is known
    pub async fn get_post(
        &self,
        post_id: Uuid,
        viewer: Option<Uuid>,
        deadline: Deadline,
    ) -> SocialResult<FeedPost> {
        self.feed
            .get_post(post_id, viewer, deadline)
            .await
            .inspect_err(SocialError::log)
    }

    pub async fn delete_post(
        &self,
        actor_id: Uuid,
        post_id: Uuid,
        deadline: Deadline,
    ) -> SocialResult<()> {
        self.posts
            .delete(actor_id, post_id, deadline)
            .await
            .inspect_err(SocialError::log)
    }
}
