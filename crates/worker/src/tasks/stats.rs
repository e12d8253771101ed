//! Periodic job statistics logger.

use picstyle_db::repositories::HistoryRepo;
use picstyle_db::DbPool;
use serde_json::{json, Value};

/// Log outcome counts per trailing period and return them as the job
/// result, so the numbers are also visible in the job record.
pub async fn run(pool: &DbPool) -> Result<Value, sqlx::Error> {
    let stats = HistoryRepo::stats(pool).await?;
    for period in &stats {
        tracing::info!(
            period = period.period,
            succeeded = period.succeeded,
            failed = period.failed,
            unfinished = period.unfinished,
            "Job statistics",
        );
    }

    let periods: Vec<Value> = stats
        .iter()
        .map(|p| {
            json!({
                "period": p.period,
                "succeeded": p.succeeded,
                "failed": p.failed,
                "unfinished": p.unfinished,
            })
        })
        .collect();
    Ok(json!({ "periods": periods }))
}
