//! Audit trail writes.

use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{error::AppError, models::activity::ActivityAction};

/// Append one audit row inside the caller's transaction.
pub async fn record(
    conn: &mut PgConnection,
    actor_id: Option<Uuid>,
    org_id: Option<Uuid>,
    action: ActivityAction,
    target: &str,
    meta: Value,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO activity_logs (actor_id, org_id, action, target, meta)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(actor_id)
    .bind(org_id)
    .bind(action.as_str())
    .bind(target)
    .bind(meta)
    .execute(conn)
    .await?;

    tracing::info!(actor_id = ?actor_id, action = action.as_str(), target, "activity recorded");
    Ok(())
}
