pub mod bands;
pub mod posts;
pub mod users;

pub use bands::BandRepository;
pub use posts::PostRepository;
pub use users::UserRepository;

use crate::domain::EntityRef;
use sqlx::PgExecutor;

/// Whether the referenced user or band row exists
pub(crate) async fn entity_exists<'e, E>(executor: E, entity: EntityRef) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
        entity.kind.table()
    );
    sqlx::query_scalar(&sql)
        .bind(entity.id)
        .fetch_one(executor)
        .await
}
