//! Database operations for `data_update_tasks`, one row per batch.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use venue_core::{CoreError, TaskStage};

use crate::DbError;

const TASK_COLUMNS: &str = "id, public_id, stage, success, forum_profile_id, profiles_total, \
     profiles_failed, posts_created, error_message, started_at, completed_at, created_at, \
     updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DataUpdateTaskRow {
    pub id: i64,
    pub public_id: Uuid,
    pub stage: String,
    /// `None` until the batch reaches the completing stage.
    pub success: Option<bool>,
    /// Set when the batch was limited to a single profile.
    pub forum_profile_id: Option<i64>,
    pub profiles_total: i32,
    pub profiles_failed: i32,
    pub posts_created: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataUpdateTaskRow {
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTaskStage`] if the stored stage is not a
    /// known stage name.
    pub fn stage(&self) -> Result<TaskStage, CoreError> {
        self.stage.parse()
    }
}

/// Per-batch counters recorded when the batch completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounters {
    pub profiles_total: i32,
    pub profiles_failed: i32,
    pub posts_created: i32,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Creates a new batch in the `PENDING` stage.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_data_update_task(
    pool: &PgPool,
    forum_profile_id: Option<i64>,
) -> Result<DataUpdateTaskRow, DbError> {
    let sql = format!(
        "INSERT INTO data_update_tasks (public_id, stage, forum_profile_id) \
         VALUES ($1, $2, $3) \
         RETURNING {TASK_COLUMNS}"
    );

    let row = sqlx::query_as::<_, DataUpdateTaskRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(TaskStage::Pending.as_str())
        .bind(forum_profile_id)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Moves a batch from `from` to `to`.
///
/// Entering `SCRAPING` stamps `started_at`; entering `DONE` stamps
/// `completed_at` if the completing stage has not already done so.
///
/// # Errors
///
/// Returns [`DbError::InvalidTaskTransition`] if the move is not allowed or
/// the row is no longer in `from`, or [`DbError::Sqlx`] if the update fails.
pub async fn advance_data_update_task(
    pool: &PgPool,
    id: i64,
    from: TaskStage,
    to: TaskStage,
) -> Result<(), DbError> {
    if !from.can_transition_to(to) {
        return Err(DbError::InvalidTaskTransition { id, from, to });
    }

    let result = sqlx::query(
        "UPDATE data_update_tasks \
         SET stage = $1, \
             started_at = CASE WHEN $1 = 'SCRAPING' THEN NOW() ELSE started_at END, \
             completed_at = CASE WHEN $1 = 'DONE' THEN COALESCE(completed_at, NOW()) \
                                 ELSE completed_at END, \
             updated_at = NOW() \
         WHERE id = $2 AND stage = $3",
    )
    .bind(to.as_str())
    .bind(id)
    .bind(from.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTaskTransition { id, from, to });
    }

    Ok(())
}

/// Records the outcome of a batch while it is in the `COMPLETING` stage.
///
/// # Errors
///
/// Returns [`DbError::InvalidTaskTransition`] if the batch is not in
/// `COMPLETING`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_data_update_task(
    pool: &PgPool,
    id: i64,
    success: bool,
    counters: TaskCounters,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE data_update_tasks \
         SET success = $1, completed_at = NOW(), profiles_total = $2, \
             profiles_failed = $3, posts_created = $4, updated_at = NOW() \
         WHERE id = $5 AND stage = 'COMPLETING'",
    )
    .bind(success)
    .bind(counters.profiles_total)
    .bind(counters.profiles_failed)
    .bind(counters.posts_created)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTaskTransition {
            id,
            from: TaskStage::Completing,
            to: TaskStage::Completing,
        });
    }

    Ok(())
}

/// Moves a batch from any non-terminal stage to `FAILED`.
///
/// # Errors
///
/// Returns [`DbError::InvalidTaskTransition`] if the batch already finished,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn fail_data_update_task(
    pool: &PgPool,
    id: i64,
    error_message: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE data_update_tasks \
         SET stage = 'FAILED', success = FALSE, error_message = $1, \
             completed_at = NOW(), updated_at = NOW() \
         WHERE id = $2 AND stage NOT IN ('DONE', 'FAILED')",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTaskTransition {
            id,
            from: TaskStage::Done,
            to: TaskStage::Failed,
        });
    }

    Ok(())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_data_update_task(pool: &PgPool, id: i64) -> Result<DataUpdateTaskRow, DbError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM data_update_tasks WHERE id = $1");
    sqlx::query_as::<_, DataUpdateTaskRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` batches, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_data_update_tasks(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<DataUpdateTaskRow>, DbError> {
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM data_update_tasks \
         ORDER BY created_at DESC, id DESC LIMIT $1"
    );
    let rows = sqlx::query_as::<_, DataUpdateTaskRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Deletes finished batches created before `older_than`. Returns how many
/// rows were removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn prune_data_update_tasks(
    pool: &PgPool,
    older_than: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM data_update_tasks \
         WHERE created_at < $1 AND stage IN ('DONE', 'FAILED')",
    )
    .bind(older_than)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
