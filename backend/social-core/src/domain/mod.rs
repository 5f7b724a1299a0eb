pub mod entity;
pub mod models;

pub use entity::{EntityKind, EntityRef, GeoPoint};
pub use models::{
    Band, BandMember, BandRole, EdgeChange, EngagementCounts, FeedPost, FollowEdge, FollowStats,
    NearbyEntity, Post, User,
};
