//! Request shapes accepted by the `SocialCore` facade
//!
//! Everything here is checked before any component or store is touched, so
//! the components themselves trust their radius, limit and offset inputs.

use crate::domain::{EntityKind, EntityRef, GeoPoint};
use crate::error::{SocialError, SocialResult};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

pub const MAX_NEARBY_RADIUS_KM: f64 = 500.0;
pub const MAX_PAGE_LIMIT: i64 = 100;
pub const DEFAULT_PAGE_LIMIT: i64 = 20;

/// Proximity search parameters
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NearbyRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    #[validate(range(exclusive_min = 0.0, max = 500.0))]
    pub radius_km: f64,

    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl NearbyRequest {
    pub fn new(latitude: f64, longitude: f64, radius_km: f64, limit: i64) -> Self {
        Self {
            latitude,
            longitude,
            radius_km,
            limit,
        }
    }

    /// Validated search center
    pub fn center(&self) -> SocialResult<GeoPoint> {
        self.validate()?;
        // range checks pass NaN through
        if !self.radius_km.is_finite() {
            return Err(SocialError::Validation("radius_km must be finite".to_string()));
        }
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Limit/offset window
#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub struct PageRequest {
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[validate(range(min = 0))]
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

impl PageRequest {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }

    pub fn checked(self) -> SocialResult<Self> {
        self.validate()?;
        Ok(self)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,

    #[validate(email, length(max = 255))]
    pub email: String,

    #[validate(length(min = 1, max = 100))]
    pub display_name: Option<String>,

    #[validate(length(max = 500))]
    pub bio: Option<String>,

    #[validate(url)]
    pub profile_picture_url: Option<String>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl CreateUserRequest {
    pub fn location(&self) -> SocialResult<Option<GeoPoint>> {
        location_pair(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBandRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 50))]
    pub genre: Option<String>,

    #[validate(url)]
    pub profile_picture_url: Option<String>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl CreateBandRequest {
    pub fn location(&self) -> SocialResult<Option<GeoPoint>> {
        location_pair(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 5000))]
    pub content: String,

    #[validate(length(max = 10))]
    #[serde(default)]
    pub media_urls: Vec<String>,
}

/// Both coordinates or neither
fn location_pair(latitude: Option<f64>, longitude: Option<f64>) -> SocialResult<Option<GeoPoint>> {
    match (latitude, longitude) {
        (Some(lat), Some(lng)) => GeoPoint::new(lat, lng).map(Some),
        (None, None) => Ok(None),
        _ => Err(SocialError::Validation(
            "latitude and longitude must be provided together".to_string(),
        )),
    }
}

/// A user may not follow themself
pub fn ensure_not_self_follow(follower_id: Uuid, target: EntityRef) -> SocialResult<()> {
    if target.kind == EntityKind::User && target.id == follower_id {
        return Err(SocialError::Validation("cannot follow yourself".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_nearby_bounds() {
        assert!(NearbyRequest::new(37.7749, -122.4194, 1.0, 20).center().is_ok());
        assert!(NearbyRequest::new(37.7749, -122.4194, MAX_NEARBY_RADIUS_KM, MAX_PAGE_LIMIT)
            .center()
            .is_ok());

        for bad in [
            NearbyRequest::new(37.7749, -122.4194, 500.1, 20),
            NearbyRequest::new(37.7749, -122.4194, 0.0, 20),
            NearbyRequest::new(37.7749, -122.4194, f64::NAN, 20),
            NearbyRequest::new(37.7749, -122.4194, 10.0, 0),
            NearbyRequest::new(37.7749, -122.4194, 10.0, 101),
            NearbyRequest::new(91.0, 0.0, 10.0, 20),
            NearbyRequest::new(0.0, -181.0, 10.0, 20),
            NearbyRequest::new(f64::NAN, 0.0, 10.0, 20),
        ] {
            let err = bad.center().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationFailed, "{:?}", bad);
        }
    }

    #[test]
    fn test_page_bounds() {
        assert!(PageRequest::new(1, 0).checked().is_ok());
        assert!(PageRequest::new(100, 5_000).checked().is_ok());
        assert!(PageRequest::new(0, 0).checked().is_err());
        assert!(PageRequest::new(101, 0).checked().is_err());
        assert!(PageRequest::new(10, -1).checked().is_err());
    }

    #[test]
    fn test_page_defaults_when_deserialized() {
        let page: PageRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(page.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(page.offset, 0);
    }

    #[test]
    fn test_user_request_rules() {
        let mut req = CreateUserRequest {
            username: "drummer42".into(),
            email: "drummer@example.com".into(),
            display_name: Some("The Drummer".into()),
            bio: None,
            profile_picture_url: Some("https://cdn.example.com/a.png".into()),
            latitude: Some(37.7749),
            longitude: Some(-122.4194),
        };
        assert!(req.validate().is_ok());
        assert!(req.location().unwrap().is_some());

        req.longitude = None;
        assert_eq!(req.location().unwrap_err().kind(), ErrorKind::ValidationFailed);

        req.email = "not-an-email".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_post_request_rules() {
        let ok = CreatePostRequest {
            content: "rehearsal tonight".into(),
            media_urls: vec![],
        };
        assert!(ok.validate().is_ok());

        let empty = CreatePostRequest {
            content: String::new(),
            media_urls: vec![],
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_self_follow_rejected_only_for_same_user() {
        let id = Uuid::new_v4();
        assert!(ensure_not_self_follow(id, EntityRef::user(id)).is_err());
        assert!(ensure_not_self_follow(id, EntityRef::user(Uuid::new_v4())).is_ok());
        // Band ids live in another table; equal ids are not a self-follow
        assert!(ensure_not_self_follow(id, EntityRef::band(id)).is_ok());
    }
}
