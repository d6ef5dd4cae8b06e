//! Work item repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};

use glossa_core::{
    reactivation_window, validate_source_key, ClaimRequest, Completion, Error, FailReason,
    ItemId, ItemState, QueueStats, Result, Scores, SubmitOutcome, WorkItem, WorkItemRepository,
};

/// Schema applied by `recreate`; the same file the migrator runs.
const SCHEMA_SQL: &str = include_str!("../../../migrations/20261001000000_work_item.sql");

const ITEM_COLUMNS: &str = "id, source_key, state::text AS state, owner, fetched_by, \
     fail_reason::text AS fail_reason, duration_secs, scores, created_at, updated_at";

/// PostgreSQL implementation of WorkItemRepository.
#[derive(Clone)]
pub struct PgWorkItemRepository {
    pool: Pool<Postgres>,
}

impl PgWorkItemRepository {
    /// Create a new PgWorkItemRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn state_strings(states: &[ItemState]) -> Vec<String> {
        states.iter().map(|s| s.as_str().to_string()).collect()
    }

    /// Parse a work_item row into a WorkItem.
    fn parse_item_row(row: sqlx::postgres::PgRow) -> Result<WorkItem> {
        let state: String = row.get("state");
        let fail_reason: Option<String> = row.get("fail_reason");
        let scores: Option<Json<Scores>> = row.get("scores");

        Ok(WorkItem {
            id: row.get("id"),
            source_key: row.get("source_key"),
            state: state.parse()?,
            owner: row.get("owner"),
            fetched_by: row.get("fetched_by"),
            fail_reason: fail_reason.as_deref().map(str::parse).transpose()?,
            duration_secs: row.get("duration_secs"),
            scores: scores.map(|Json(s)| s),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl WorkItemRepository for PgWorkItemRepository {
    async fn submit(&self, source_key: &str) -> Result<SubmitOutcome> {
        validate_source_key(source_key)?;

        let timed_reasons: Vec<String> = FailReason::timed_retry()
            .iter()
            .map(|r| r.as_str().to_string())
            .collect();
        let cutoff = Utc::now() - reactivation_window();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // The unique index makes concurrent submissions of one key collapse
        // onto a single row.
        let created: Option<ItemId> = sqlx::query_scalar(
            "INSERT INTO work_item (source_key) VALUES ($1)
             ON CONFLICT (source_key) DO NOTHING
             RETURNING id",
        )
        .bind(source_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let reactivated: Option<ItemId> = if created.is_none() {
            sqlx::query_scalar(
                "UPDATE work_item
                 SET state = 'INIT'::item_state, owner = NULL, fetched_by = NULL,
                     fail_reason = NULL, updated_at = now()
                 WHERE source_key = $1
                   AND state = 'FAILED'::item_state
                   AND fail_reason = ANY($2::text[]::fail_reason[])
                   AND updated_at < $3
                 RETURNING id",
            )
            .bind(source_key)
            .bind(&timed_reasons)
            .bind(cutoff)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?
        } else {
            None
        };

        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM work_item WHERE source_key = $1"
        ))
        .bind(source_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;
        let item = Self::parse_item_row(row)?;

        let queue_depth: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM work_item
             WHERE state NOT IN ('SCORED'::item_state, 'FAILED'::item_state)",
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        if let Some(id) = created {
            info!(
                subsystem = "database",
                component = "items",
                op = "submit",
                item_id = id,
                source_key,
                "Added new work item"
            );
        } else if let Some(id) = reactivated {
            info!(
                subsystem = "database",
                component = "items",
                op = "reactivate",
                item_id = id,
                source_key,
                "Reactivated timed-retry failure"
            );
        }

        Ok(SubmitOutcome {
            item,
            queue_depth,
            reactivated: reactivated.is_some(),
        })
    }

    async fn lookup(&self, source_key: &str) -> Result<Option<WorkItem>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM work_item WHERE source_key = $1"
        ))
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_item_row).transpose()
    }

    async fn get(&self, id: ItemId) -> Result<Option<WorkItem>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM work_item WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_item_row).transpose()
    }

    async fn claim_next(&self, request: &ClaimRequest<'_>) -> Result<Option<WorkItem>> {
        request.validate()?;
        let eligible = Self::state_strings(request.eligible);

        // FOR UPDATE SKIP LOCKED: concurrent claimers each lock a different
        // row, and a row locked by one transaction is invisible to the rest.
        let row = sqlx::query(&format!(
            "UPDATE work_item
             SET state = $1::item_state, owner = $2, updated_at = now()
             WHERE id = (
                 SELECT id FROM work_item
                 WHERE state = ANY($3::text[]::item_state[])
                   AND ($4::text IS NULL OR fetched_by = $4)
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(request.claimed_state.as_str())
        .bind(request.worker_id)
        .bind(&eligible)
        .bind(request.fetched_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let item = row.map(Self::parse_item_row).transpose()?;
        if let Some(ref item) = item {
            debug!(
                subsystem = "database",
                component = "items",
                op = "claim_next",
                item_id = item.id,
                source_key = %item.source_key,
                worker_id = request.worker_id,
                state = %item.state,
                "Claimed work item"
            );
        }
        Ok(item)
    }

    async fn complete(
        &self,
        id: ItemId,
        worker_id: &str,
        completion: &Completion,
    ) -> Result<WorkItem> {
        completion.validate()?;

        let row = sqlx::query(&format!(
            "UPDATE work_item
             SET state = $3::item_state,
                 fail_reason = $4::fail_reason,
                 duration_secs = COALESCE($5, duration_secs),
                 scores = $6,
                 fetched_by = CASE WHEN $3 = 'FETCHED' THEN owner ELSE fetched_by END,
                 owner = NULL,
                 updated_at = now()
             WHERE id = $1
               AND owner = $2
               AND state IN ('FETCHING'::item_state, 'SCORING'::item_state)
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(id)
        .bind(worker_id)
        .bind(completion.state.as_str())
        .bind(completion.fail_reason.map(|r| r.as_str()))
        .bind(completion.duration_secs)
        .bind(completion.scores.as_ref().map(Json))
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Self::parse_item_row(row),
            None => match self.get(id).await? {
                Some(_) => Err(Error::OwnershipLost {
                    item_id: id,
                    worker_id: worker_id.to_string(),
                }),
                None => Err(Error::ItemNotFound(id)),
            },
        }
    }

    async fn bulk_reset(&self, states: &[ItemState], target: ItemState) -> Result<u64> {
        if target.is_in_progress() || target == ItemState::Scored {
            return Err(Error::InvalidInput(format!(
                "cannot bulk reset items into {target}"
            )));
        }
        let from = Self::state_strings(states);

        let result = sqlx::query(
            "UPDATE work_item
             SET state = $1::item_state,
                 owner = NULL,
                 fetched_by = CASE WHEN $1 = 'INIT' THEN NULL ELSE fetched_by END,
                 fail_reason = CASE WHEN $1 = 'FAILED' THEN fail_reason ELSE NULL END,
                 scores = NULL,
                 updated_at = now()
             WHERE state = ANY($2::text[]::item_state[])",
        )
        .bind(target.as_str())
        .bind(&from)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn reset_unclassified_failures(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE work_item
             SET state = 'INIT'::item_state, owner = NULL, fetched_by = NULL, updated_at = now()
             WHERE state = 'FAILED'::item_state AND fail_reason IS NULL",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn count_fetched_by(&self, worker_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM work_item
             WHERE state = 'FETCHED'::item_state AND fetched_by = $1",
        )
        .bind(worker_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(count)
    }

    async fn queue_depth(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM work_item
             WHERE state NOT IN ('SCORED'::item_state, 'FAILED'::item_state)",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(count)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query(
            "SELECT state::text AS state,
                    COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE fail_reason IS NULL) AS unclassified
             FROM work_item
             GROUP BY state",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut stats = QueueStats::default();
        for row in rows {
            let state: ItemState = row.get::<String, _>("state").parse()?;
            stats.add(state, row.get("total"));
            if state == ItemState::Failed {
                stats.failed_unclassified = row.get("unclassified");
            }
        }
        Ok(stats)
    }

    async fn recreate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Simple-protocol execution so multi-statement strings are accepted.
        sqlx::Executor::execute(
            &mut *tx,
            "DROP TABLE IF EXISTS work_item;
             DROP TYPE IF EXISTS fail_reason;
             DROP TYPE IF EXISTS item_state;",
        )
        .await
        .map_err(Error::Database)?;

        sqlx::Executor::execute(&mut *tx, SCHEMA_SQL)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "items",
            op = "recreate",
            "Work item table recreated"
        );
        Ok(())
    }
}
