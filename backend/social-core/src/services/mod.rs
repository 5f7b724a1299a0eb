pub mod engagement;
pub mod feed;
pub mod geo;
pub mod graph;
pub mod social;
pub mod transaction;

pub use engagement::{Engagement, EngagementLedger};
pub use feed::{assemble_feed, FeedComposer, FeedScope};
pub use geo::{haversine_meters, BoundingBox, GeoProximityIndex, EARTH_RADIUS_METERS};
pub use graph::SocialGraph;
pub use social::SocialCore;
pub use transaction::{TransactionCoordinator, TransactionalStore, TxMode};
