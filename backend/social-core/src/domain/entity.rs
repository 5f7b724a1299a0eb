use crate::error::{SocialError, SocialResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of entity that can be followed, author posts or be searched by location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Band,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Band => "band",
        }
    }

    /// Table holding entities of this kind
    pub(crate) fn table(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Band => "bands",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = SocialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityKind::User),
            "band" => Ok(EntityKind::Band),
            other => Err(SocialError::Internal(format!("unknown entity kind '{}'", other))),
        }
    }
}

/// Tagged reference to a user or a band
///
/// Post authors and follow targets use this instead of a pair of nullable ids,
/// so "exactly one of user/band" cannot be violated in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    pub fn user(id: Uuid) -> Self {
        Self {
            kind: EntityKind::User,
            id,
        }
    }

    pub fn band(id: Uuid) -> Self {
        Self {
            kind: EntityKind::Band,
            id,
        }
    }

    /// Rebuild from the `(kind, user_id, band_id)` column triple used by `posts`
    pub(crate) fn from_columns(
        kind: &str,
        user_id: Option<Uuid>,
        band_id: Option<Uuid>,
    ) -> SocialResult<Self> {
        match (kind.parse::<EntityKind>()?, user_id, band_id) {
            (EntityKind::User, Some(id), None) => Ok(Self::user(id)),
            (EntityKind::Band, None, Some(id)) => Ok(Self::band(id)),
            (kind, user_id, band_id) => Err(SocialError::Internal(format!(
                "author columns inconsistent: kind={} user_id={:?} band_id={:?}",
                kind, user_id, band_id
            ))),
        }
    }

    /// `(user_id, band_id)` column values for this reference
    pub(crate) fn to_columns(&self) -> (Option<Uuid>, Option<Uuid>) {
        match self.kind {
            EntityKind::User => (Some(self.id), None),
            EntityKind::Band => (None, Some(self.id)),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// WGS-84 point (degrees)
///
/// Only constructed through `GeoPoint::new`, deserialization included, so a
/// value in hand is always within range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = SocialError;

    fn try_from(raw: RawGeoPoint) -> SocialResult<Self> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> SocialResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(SocialError::Validation(
                "Invalid latitude: must be between -90 and 90".to_string(),
            ));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(SocialError::Validation(
                "Invalid longitude: must be between -180 and 180".to_string(),
            ));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude (-90 to 90)
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude (-180 to 180)
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Both columns set or both null; anything else is a corrupt row
    pub(crate) fn from_columns(
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> SocialResult<Option<Self>> {
        match (latitude, longitude) {
            (Some(lat), Some(lng)) => Self::new(lat, lng).map(Some),
            (None, None) => Ok(None),
            _ => Err(SocialError::Internal(
                "location columns must be both set or both null".to_string(),
            )),
        }
    }
}
