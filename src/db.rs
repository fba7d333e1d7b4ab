use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::join::FINISHED_STATUS;
use crate::models::{AssignmentRow, QueryWindow, TaskRow};
use crate::performance::PropertyBaselines;

pub const HOUSEKEEPING: &str = "housekeeping";

/// Paging policy for assignment lookups.
#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    pub assignment_batch_size: usize,
    pub fetch_concurrency: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            assignment_batch_size: 500,
            fetch_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TaskCsvRow {
    pub task_id: i64,
    pub property_id: Option<i64>,
    pub property_name: Option<String>,
    pub department: Option<String>,
    pub status: Option<String>,
    pub duration_minutes: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AssignmentCsvRow {
    pub task_id: i64,
    pub worker_name: String,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_task(pool: &PgPool, row: &TaskCsvRow) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO housekeeping_performance.tasks
        (task_id, property_id, property_name, department, status, duration_minutes, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (task_id) DO UPDATE
        SET property_id = EXCLUDED.property_id,
            property_name = EXCLUDED.property_name,
            department = EXCLUDED.department,
            status = EXCLUDED.status,
            duration_minutes = EXCLUDED.duration_minutes,
            completed_at = EXCLUDED.completed_at
        "#,
    )
    .bind(row.task_id)
    .bind(row.property_id)
    .bind(&row.property_name)
    .bind(row.department.as_deref().unwrap_or(HOUSEKEEPING))
    .bind(&row.status)
    .bind(row.duration_minutes)
    .bind(row.completed_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

async fn insert_assignment(pool: &PgPool, task_id: i64, worker_name: &str) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO housekeeping_performance.task_assignments (task_id, worker_name)
        VALUES ($1, $2)
        ON CONFLICT (task_id, worker_name) DO NOTHING
        "#,
    )
    .bind(task_id)
    .bind(worker_name)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

const SEED_PROPERTIES: [(i64, &str, f64); 3] = [
    (101, "Harbor Loft", 55.0),
    (102, "Cedar Cottage", 85.0),
    (103, "Summit Chalet", 140.0),
];

/// (name, pace relative to the property norm, change in pace per week)
const SEED_WORKERS: [(&str, f64, f64); 3] = [
    ("Avery Lee", 0.9, -0.08),
    ("Jules Moreno", 1.0, 0.0),
    ("Kiara Patel", 1.1, 0.09),
];

/// Four weeks of cleans ending yesterday. Re-running overwrites the same task ids.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let today = Utc::now().date_naive();
    let mut task_id = 9_000i64;

    for week in 0..4i64 {
        let week_day = today - Duration::days((3 - week) * 7 + 2);

        for (worker_idx, (worker, pace, drift)) in SEED_WORKERS.iter().enumerate() {
            for clean in 0..3usize {
                let (property_id, property_name, norm) =
                    SEED_PROPERTIES[(worker_idx + clean) % SEED_PROPERTIES.len()];
                // the first two cleans of the week share a day
                let day = week_day + Duration::days(clean.saturating_sub(1) as i64);
                let completed_at = day
                    .and_hms_opt(9 + 2 * clean as u32, 30, 0)
                    .context("invalid seed time")?
                    .and_utc();

                task_id += 1;
                upsert_task(
                    pool,
                    &TaskCsvRow {
                        task_id,
                        property_id: Some(property_id),
                        property_name: Some(property_name.to_string()),
                        department: Some(HOUSEKEEPING.to_string()),
                        status: Some(FINISHED_STATUS.to_string()),
                        duration_minutes: Some((norm * pace * (1.0 + drift * week as f64)).round()),
                        completed_at: Some(completed_at),
                    },
                )
                .await?;
                insert_assignment(pool, task_id, worker).await?;
            }
        }

        // a deep clean shared by two workers
        task_id += 1;
        upsert_task(
            pool,
            &TaskCsvRow {
                task_id,
                property_id: Some(103),
                property_name: Some("Summit Chalet".to_string()),
                department: Some(HOUSEKEEPING.to_string()),
                status: Some(FINISHED_STATUS.to_string()),
                duration_minutes: Some(180.0),
                completed_at: Some(
                    (week_day + Duration::days(1))
                        .and_hms_opt(16, 0, 0)
                        .context("invalid seed time")?
                        .and_utc(),
                ),
            },
        )
        .await?;
        insert_assignment(pool, task_id, "Avery Lee").await?;
        insert_assignment(pool, task_id, "Jules Moreno").await?;
    }

    // rows that the analytics must ignore: a test account and an unfinished clean
    let ignored = [
        (0, FINISHED_STATUS, Some(2.0)),
        (1, FINISHED_STATUS, Some(3.0)),
        (2, FINISHED_STATUS, Some(2.0)),
        (3, "in_progress", None),
    ];
    for (offset, status, minutes) in ignored {
        task_id += 1;
        upsert_task(
            pool,
            &TaskCsvRow {
                task_id,
                property_id: Some(101),
                property_name: Some("Harbor Loft".to_string()),
                department: Some(HOUSEKEEPING.to_string()),
                status: Some(status.to_string()),
                duration_minutes: minutes,
                completed_at: (today - Duration::days(offset + 1))
                    .and_hms_opt(8, 0, 0)
                    .map(|t| t.and_utc()),
            },
        )
        .await?;
        insert_assignment(pool, task_id, "QA Tester").await?;
    }

    info!(last_task_id = task_id, "seeded housekeeping tasks");
    Ok(())
}

pub async fn fetch_finished_tasks(pool: &PgPool, window: &QueryWindow) -> anyhow::Result<Vec<TaskRow>> {
    let records = sqlx::query(
        r#"
        SELECT task_id, duration_minutes, property_id, property_name, completed_at, status
        FROM housekeeping_performance.tasks
        WHERE department = $1
          AND status = $2
          AND completed_at >= $3
          AND completed_at < $4
        ORDER BY completed_at, task_id
        "#,
    )
    .bind(HOUSEKEEPING)
    .bind(FINISHED_STATUS)
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await
    .context("failed to fetch finished tasks")?;

    let tasks: Vec<TaskRow> = records
        .into_iter()
        .map(|row| TaskRow {
            task_id: row.get("task_id"),
            duration_minutes: row.get("duration_minutes"),
            property_id: row.get("property_id"),
            property_name: row.get("property_name"),
            completed_at: row.get("completed_at"),
            status: row.get("status"),
        })
        .collect();

    info!(tasks = tasks.len(), start = %window.start, end = %window.end, "fetched finished tasks");
    Ok(tasks)
}

async fn fetch_assignment_batch(pool: &PgPool, task_ids: Vec<i64>) -> anyhow::Result<Vec<AssignmentRow>> {
    let records = sqlx::query(
        r#"
        SELECT task_id, worker_name
        FROM housekeeping_performance.task_assignments
        WHERE task_id = ANY($1)
        ORDER BY task_id, worker_name
        "#,
    )
    .bind(&task_ids)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch assignments for {} tasks", task_ids.len()))?;

    Ok(records
        .into_iter()
        .map(|row| AssignmentRow {
            task_id: row.get("task_id"),
            worker_name: row.get("worker_name"),
        })
        .collect())
}

/// Looks up assignments in fixed-size batches, several in flight at once.
/// Returns only after every batch has arrived; one failed batch fails the lot.
pub async fn fetch_assignments(
    pool: &PgPool,
    task_ids: &[i64],
    config: &LoaderConfig,
) -> anyhow::Result<Vec<AssignmentRow>> {
    let batch_size = config.assignment_batch_size.max(1);
    let batches: Vec<Vec<AssignmentRow>> = stream::iter(task_ids.chunks(batch_size).map(<[i64]>::to_vec))
        .map(|batch| {
            debug!(size = batch.len(), "fetching assignment batch");
            fetch_assignment_batch(pool, batch)
        })
        .buffered(config.fetch_concurrency.max(1))
        .try_collect()
        .await?;

    let assignments: Vec<AssignmentRow> = batches.into_iter().flatten().collect();
    info!(
        tasks = task_ids.len(),
        batch_size,
        assignments = assignments.len(),
        "fetched task assignments"
    );
    Ok(assignments)
}

/// Historical average minutes per property across every finished clean.
pub async fn fetch_property_baselines(pool: &PgPool) -> anyhow::Result<PropertyBaselines> {
    let records = sqlx::query(
        r#"
        SELECT property_id, AVG(duration_minutes) AS baseline_avg_minutes
        FROM housekeeping_performance.tasks
        WHERE department = $1
          AND status = $2
          AND property_id IS NOT NULL
          AND duration_minutes > 0
        GROUP BY property_id
        "#,
    )
    .bind(HOUSEKEEPING)
    .bind(FINISHED_STATUS)
    .fetch_all(pool)
    .await
    .context("failed to fetch property baselines")?;

    let mut baselines = PropertyBaselines::new();
    for row in records {
        let property_id: i64 = row.get("property_id");
        let baseline: Option<f64> = row.get("baseline_avg_minutes");
        if let Some(value) = baseline {
            baselines.insert(property_id, value);
        }
    }

    info!(properties = baselines.len(), "fetched property baselines");
    Ok(baselines)
}

pub async fn import_tasks_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut written = 0usize;

    for result in reader.deserialize::<TaskCsvRow>() {
        let row = result?;
        if upsert_task(pool, &row).await? > 0 {
            written += 1;
        }
    }

    Ok(written)
}

pub async fn import_assignments_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<AssignmentCsvRow>() {
        let row = result?;
        if insert_assignment(pool, row.task_id, row.worker_name.trim()).await? > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
