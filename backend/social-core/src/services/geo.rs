//! Proximity search over user and band locations
//!
//! Distances are great-circle (haversine) on a spherical earth and are
//! computed by Postgres. A bounding box computed here narrows the candidate
//! rows through the `(latitude, longitude)` indexes before the exact distance
//! filter runs.

use crate::domain::{EntityKind, EntityRef, GeoPoint, NearbyEntity};
use crate::error::{SocialError, SocialResult};
use resilience::{with_deadline, Deadline};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// IUGG mean earth radius
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Slack added to every box edge so float rounding never drops a boundary hit
const BOX_MARGIN_DEGREES: f64 = 1e-6;

/// Great-circle distance between two points in meters
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude().to_radians();
    let lat2 = b.latitude().to_radians();
    let delta_lat = (b.latitude() - a.latitude()).to_radians();
    let delta_lng = (b.longitude() - a.longitude()).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Latitude/longitude rectangle enclosing a search circle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Smallest box (plus margin) containing every point within `radius_meters`
    ///
    /// Circles that reach a pole or cross the antimeridian get the full
    /// longitude range instead of a split box.
    pub fn around(center: GeoPoint, radius_meters: f64) -> Self {
        let angular = (radius_meters / EARTH_RADIUS_METERS).to_degrees();
        let min_latitude = center.latitude() - angular;
        let max_latitude = center.latitude() + angular;

        let full = Self {
            min_latitude: (min_latitude - BOX_MARGIN_DEGREES).max(-90.0),
            max_latitude: (max_latitude + BOX_MARGIN_DEGREES).min(90.0),
            min_longitude: -180.0,
            max_longitude: 180.0,
        };

        if min_latitude <= -90.0 || max_latitude >= 90.0 {
            return full;
        }

        let delta_lng = ((radius_meters / EARTH_RADIUS_METERS).sin()
            / center.latitude().to_radians().cos())
        .min(1.0)
        .asin()
        .to_degrees();

        let min_longitude = center.longitude() - delta_lng - BOX_MARGIN_DEGREES;
        let max_longitude = center.longitude() + delta_lng + BOX_MARGIN_DEGREES;
        if min_longitude < -180.0 || max_longitude > 180.0 {
            return full;
        }

        Self {
            min_longitude,
            max_longitude,
            ..full
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&point.latitude())
            && (self.min_longitude..=self.max_longitude).contains(&point.longitude())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NearbyRow {
    id: Uuid,
    name: String,
    profile_picture_url: Option<String>,
    latitude: f64,
    longitude: f64,
    distance_meters: f64,
}

impl NearbyRow {
    fn into_entity(self, kind: EntityKind) -> SocialResult<NearbyEntity> {
        Ok(NearbyEntity {
            entity: EntityRef { kind, id: self.id },
            name: self.name,
            profile_picture_url: self.profile_picture_url,
            location: GeoPoint::new(self.latitude, self.longitude)?,
            distance_meters: self.distance_meters,
        })
    }
}

/// Display name column per entity kind
fn name_column(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => "COALESCE(display_name, username)",
        EntityKind::Band => "name",
    }
}

fn nearby_query(kind: EntityKind) -> String {
    format!(
        r#"
        SELECT id, name, profile_picture_url, latitude, longitude, distance_meters
        FROM (
            SELECT id,
                   {name} AS name,
                   profile_picture_url,
                   latitude,
                   longitude,
                   2 * $7 * ASIN(LEAST(1.0, SQRT(
                       POWER(SIN(RADIANS(latitude - $1) / 2), 2)
                       + COS(RADIANS($1)) * COS(RADIANS(latitude))
                         * POWER(SIN(RADIANS(longitude - $2) / 2), 2)
                   ))) AS distance_meters
            FROM {table}
            WHERE latitude IS NOT NULL
              AND longitude IS NOT NULL
              AND latitude BETWEEN $3 AND $4
              AND longitude BETWEEN $5 AND $6
        ) candidates
        WHERE distance_meters <= $8
        ORDER BY distance_meters ASC, id ASC
        LIMIT $9
        "#,
        name = name_column(kind),
        table = kind.table(),
    )
}

/// Radius search over entities with a stored location
#[derive(Clone)]
pub struct GeoProximityIndex {
    pool: PgPool,
}

impl GeoProximityIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Entities of `kind` within `radius_km` of `center`, nearest first
    ///
    /// Ties on distance are ordered by id. Entities without a location never
    /// match. `radius_km` and `limit` are expected to be validated already.
    pub async fn find_nearby(
        &self,
        kind: EntityKind,
        center: GeoPoint,
        radius_km: f64,
        limit: i64,
        deadline: Deadline,
    ) -> SocialResult<Vec<NearbyEntity>> {
        if radius_km < 0.0 || limit <= 0 {
            return Err(SocialError::Validation(
                "radius must be non-negative and limit positive".to_string(),
            ));
        }

        let radius_meters = radius_km * 1000.0;
        let bbox = BoundingBox::around(center, radius_meters);
        let sql = nearby_query(kind);

        let rows = with_deadline(
            deadline,
            "find_nearby",
            sqlx::query_as::<_, NearbyRow>(&sql)
                .bind(center.latitude())
                .bind(center.longitude())
                .bind(bbox.min_latitude)
                .bind(bbox.max_latitude)
                .bind(bbox.min_longitude)
                .bind(bbox.max_longitude)
                .bind(EARTH_RADIUS_METERS)
                .bind(radius_meters)
                .bind(limit)
                .fetch_all(&self.pool),
        )
        .await??;

        debug!(
            kind = kind.as_str(),
            radius_km,
            hits = rows.len(),
            "proximity search completed"
        );

        rows.into_iter().map(|row| row.into_entity(kind)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Point reached by travelling `distance` meters from `origin` on `bearing` degrees
    fn destination(origin: GeoPoint, bearing: f64, distance: f64) -> GeoPoint {
        let delta = distance / EARTH_RADIUS_METERS;
        let theta = bearing.to_radians();
        let lat1 = origin.latitude().to_radians();
        let lng1 = origin.longitude().to_radians();

        let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
        let lng2 = lng1
            + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

        let lng2 = (lng2.to_degrees() + 540.0) % 360.0 - 180.0;
        GeoPoint::new(lat2.to_degrees(), lng2).unwrap()
    }

    fn san_francisco() -> GeoPoint {
        GeoPoint::new(37.7749, -122.4194).unwrap()
    }

    #[test]
    fn test_haversine_known_distance() {
        // SF to LA is roughly 559 km
        let la = GeoPoint::new(34.0522, -118.2437).unwrap();
        let d = haversine_meters(san_francisco(), la);
        assert!((d - 559_000.0).abs() < 2_000.0, "got {}", d);
        assert_eq!(haversine_meters(la, la), 0.0);
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let a = GeoPoint::new(-33.8688, 151.2093).unwrap();
        let b = GeoPoint::new(51.5074, -0.1278).unwrap();
        let ab = haversine_meters(a, b);
        let ba = haversine_meters(b, a);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_box_contains_circle_edge() {
        for center in [
            san_francisco(),
            GeoPoint::new(0.0, 0.0).unwrap(),
            GeoPoint::new(-54.8, -68.3).unwrap(),
            GeoPoint::new(69.6, 18.9).unwrap(),
        ] {
            for radius in [1_000.0, 25_000.0, 500_000.0] {
                let bbox = BoundingBox::around(center, radius);
                for step in 0..72 {
                    let edge = destination(center, step as f64 * 5.0, radius);
                    assert!(
                        bbox.contains(edge),
                        "{:?} r={} bearing={} missed {:?}",
                        center,
                        radius,
                        step * 5,
                        edge
                    );
                }
            }
        }
    }

    #[test]
    fn test_box_is_tight_away_from_poles() {
        let bbox = BoundingBox::around(san_francisco(), 1_000.0);
        // 1 km is ~0.009 degrees of latitude
        assert!(bbox.max_latitude - bbox.min_latitude < 0.02);
        assert!(bbox.max_longitude - bbox.min_longitude < 0.03);
        assert!(!bbox.contains(GeoPoint::new(37.80, -122.4194).unwrap()));
    }

    #[test]
    fn test_box_widens_near_pole() {
        let bbox = BoundingBox::around(GeoPoint::new(89.99, 10.0).unwrap(), 5_000.0);
        assert_eq!(bbox.max_latitude, 90.0);
        assert_eq!(bbox.min_longitude, -180.0);
        assert_eq!(bbox.max_longitude, 180.0);
    }

    #[test]
    fn test_box_widens_across_antimeridian() {
        let fiji = GeoPoint::new(-17.7, 179.99).unwrap();
        let bbox = BoundingBox::around(fiji, 10_000.0);
        assert_eq!(bbox.min_longitude, -180.0);
        assert_eq!(bbox.max_longitude, 180.0);
        assert!(bbox.contains(destination(fiji, 90.0, 9_000.0)));
    }

    #[test]
    fn test_query_targets_kind_table() {
        let users = nearby_query(EntityKind::User);
        assert!(users.contains("FROM users"));
        assert!(users.contains("COALESCE(display_name, username)"));
        assert!(users.contains("ORDER BY distance_meters ASC, id ASC"));

        let bands = nearby_query(EntityKind::Band);
        assert!(bands.contains("FROM bands"));
        assert!(!bands.contains("username"));
    }
}
