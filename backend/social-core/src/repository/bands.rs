use crate::domain::models::{BandMemberRow, BandRow};
use crate::domain::{Band, BandMember, BandRole, EntityRef, GeoPoint};
use crate::error::{SocialError, SocialResult};
use crate::repository::entity_exists;
use crate::services::transaction::TransactionCoordinator;
use crate::validation::CreateBandRequest;
use resilience::{with_deadline, Deadline};
use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::info;
use uuid::Uuid;

const BAND_COLUMNS: &str = "id, name, description, genre, profile_picture_url, \
                            latitude, longitude, created_at, updated_at";

/// Repository for bands and their memberships
#[derive(Clone)]
pub struct BandRepository {
    pool: PgPool,
    coordinator: TransactionCoordinator,
}

impl BandRepository {
    pub fn new(pool: PgPool, coordinator: TransactionCoordinator) -> Self {
        Self { pool, coordinator }
    }

    /// Band row and the creator's admin membership, committed together
    pub async fn create(
        &self,
        creator_id: Uuid,
        request: CreateBandRequest,
        deadline: Deadline,
    ) -> SocialResult<Band> {
        let location = request.location()?;
        let band = self
            .coordinator
            .run_atomic(deadline, "create_band", move |tx| {
                Box::pin(insert_band_with_admin(&mut **tx, creator_id, request, location))
            })
            .await?;

        info!(band_id = %band.id, creator_id = %creator_id, "band created");
        Ok(band)
    }

    pub async fn get(&self, band_id: Uuid, deadline: Deadline) -> SocialResult<Band> {
        let sql = format!("SELECT {BAND_COLUMNS} FROM bands WHERE id = $1");
        let row = with_deadline(
            deadline,
            "get_band",
            sqlx::query_as::<_, BandRow>(&sql)
                .bind(band_id)
                .fetch_optional(&self.pool),
        )
        .await??
        .ok_or_else(|| SocialError::not_found("band", band_id))?;

        Band::try_from(row)
    }

    /// Admin-only location change; `None` removes the band from proximity search
    pub async fn update_location(
        &self,
        actor_id: Uuid,
        band_id: Uuid,
        location: Option<GeoPoint>,
        deadline: Deadline,
    ) -> SocialResult<Band> {
        let band = self
            .coordinator
            .run_atomic(deadline, "update_band_location", move |tx| {
                Box::pin(set_band_location(&mut **tx, actor_id, band_id, location))
            })
            .await?;

        info!(band_id = %band_id, has_location = location.is_some(), "band location updated");
        Ok(band)
    }

    /// Members ordered by join time, oldest first
    pub async fn list_members(
        &self,
        band_id: Uuid,
        limit: i64,
        offset: i64,
        deadline: Deadline,
    ) -> SocialResult<Vec<BandMember>> {
        let rows = with_deadline(
            deadline,
            "list_band_members",
            sqlx::query_as::<_, BandMemberRow>(
                r#"
                SELECT band_id, user_id, role, joined_at
                FROM band_members
                WHERE band_id = $1
                ORDER BY joined_at ASC, user_id ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(band_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool),
        )
        .await??;

        Ok(rows.into_iter().map(BandMember::from).collect())
    }

    /// Joining twice is a business rule violation, not a no-op
    pub async fn join(&self, band_id: Uuid, user_id: Uuid, deadline: Deadline) -> SocialResult<BandMember> {
        let row = with_deadline(
            deadline,
            "join_band",
            sqlx::query_as::<_, BandMemberRow>(
                r#"
                INSERT INTO band_members (band_id, user_id, role, joined_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (band_id, user_id) DO NOTHING
                RETURNING band_id, user_id, role, joined_at
                "#,
            )
            .bind(band_id)
            .bind(user_id)
            .bind(BandRole::Member.as_str())
            .fetch_optional(&self.pool),
        )
        .await??
        .ok_or_else(|| SocialError::BusinessRule("user is already a member of this band".to_string()))?;

        info!(band_id = %band_id, user_id = %user_id, "band joined");
        Ok(BandMember::from(row))
    }

    /// Leaving a band one is not in is a business rule violation
    ///
    /// Removing the last admin is allowed here.
    pub async fn leave(&self, band_id: Uuid, user_id: Uuid, deadline: Deadline) -> SocialResult<()> {
        self.coordinator
            .run_atomic(deadline, "leave_band", move |tx| {
                Box::pin(delete_membership(&mut **tx, band_id, user_id))
            })
            .await?;

        info!(band_id = %band_id, user_id = %user_id, "band left");
        Ok(())
    }
}

/// Role of `user_id` in `band_id`, if a member
pub(crate) async fn member_role<'e, E>(
    executor: E,
    band_id: Uuid,
    user_id: Uuid,
) -> Result<Option<BandRole>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let role: Option<String> = sqlx::query_scalar(
        "SELECT role FROM band_members WHERE band_id = $1 AND user_id = $2",
    )
    .bind(band_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(role.as_deref().map(BandRole::parse))
}

async fn insert_band_with_admin(
    conn: &mut PgConnection,
    creator_id: Uuid,
    request: CreateBandRequest,
    location: Option<GeoPoint>,
) -> SocialResult<Band> {
    let sql = format!(
        r#"
        INSERT INTO bands (id, name, description, genre, profile_picture_url,
                           latitude, longitude, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
        RETURNING {BAND_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, BandRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.genre)
        .bind(&request.profile_picture_url)
        .bind(location.map(|p| p.latitude()))
        .bind(location.map(|p| p.longitude()))
        .fetch_one(&mut *conn)
        .await?;

    // Unknown creator fails on the user foreign key and undoes the band insert
    sqlx::query(
        r#"
        INSERT INTO band_members (band_id, user_id, role, joined_at)
        VALUES ($1, $2, $3, NOW())
        "#,
    )
    .bind(row.id)
    .bind(creator_id)
    .bind(BandRole::Admin.as_str())
    .execute(&mut *conn)
    .await?;

    Band::try_from(row)
}

async fn set_band_location(
    conn: &mut PgConnection,
    actor_id: Uuid,
    band_id: Uuid,
    location: Option<GeoPoint>,
) -> SocialResult<Band> {
    if !entity_exists(&mut *conn, EntityRef::band(band_id)).await? {
        return Err(SocialError::not_found("band", band_id));
    }
    if member_role(&mut *conn, band_id, actor_id).await? != Some(BandRole::Admin) {
        return Err(SocialError::BusinessRule(
            "only band admins can change the band location".to_string(),
        ));
    }

    let sql = format!(
        r#"
        UPDATE bands
        SET latitude = $2, longitude = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING {BAND_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, BandRow>(&sql)
        .bind(band_id)
        .bind(location.map(|p| p.latitude()))
        .bind(location.map(|p| p.longitude()))
        .fetch_one(&mut *conn)
        .await?;

    Band::try_from(row)
}

async fn delete_membership(conn: &mut PgConnection, band_id: Uuid, user_id: Uuid) -> SocialResult<()> {
    if !entity_exists(&mut *conn, EntityRef::band(band_id)).await? {
        return Err(SocialError::not_found("band", band_id));
    }

    let affected = sqlx::query("DELETE FROM band_members WHERE band_id = $1 AND user_id = $2")
        .bind(band_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if affected == 0 {
        return Err(SocialError::BusinessRule(
            "user is not a member of this band".to_string(),
        ));
    }
    Ok(())
}
