//! Social core for the Bandmate backend
//!
//! Proximity search over users and bands, the follow graph, likes and
//! reposts, feed composition and the transaction coordinator that keeps
//! multi-row writes atomic. `SocialCore` is the entry point used by the
//! request layer.

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod repository;
pub mod services;
pub mod validation;

pub use error::{ErrorKind, SocialError, SocialResult};
pub use resilience::Deadline;
pub use services::SocialCore;
