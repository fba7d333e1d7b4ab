use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::models::{AssignmentRow, CleanEvent, TaskRow};

pub const FINISHED_STATUS: &str = "finished";

/// Narrowed view of a task row that passed validation.
struct EligibleTask<'a> {
    duration_minutes: f64,
    property_id: i64,
    property_name: &'a str,
    completed_at: chrono::DateTime<chrono::Utc>,
}

fn eligible(task: &TaskRow) -> Option<EligibleTask<'_>> {
    if task.status.as_deref() != Some(FINISHED_STATUS) {
        return None;
    }
    let duration_minutes = task.duration_minutes.filter(|d| d.is_finite() && *d > 0.0)?;
    Some(EligibleTask {
        duration_minutes,
        property_id: task.property_id?,
        property_name: task.property_name.as_deref().unwrap_or(""),
        completed_at: task.completed_at?,
    })
}

/// Expands finished tasks into one clean event per assigned worker.
///
/// Tasks without a duration, completion time or any usable assignment are
/// dropped, as are assignments that point at unknown tasks. A worker listed
/// twice on the same task still counts once.
pub fn join_assignments(tasks: &[TaskRow], assignments: &[AssignmentRow]) -> Vec<CleanEvent> {
    let mut workers_by_task: HashMap<i64, BTreeSet<&str>> = HashMap::new();
    let mut skipped_assignments = 0usize;

    for row in assignments {
        let worker = row.worker_name.as_deref().map(str::trim).unwrap_or("");
        match row.task_id {
            Some(task_id) if !worker.is_empty() => {
                workers_by_task.entry(task_id).or_default().insert(worker);
            }
            _ => skipped_assignments += 1,
        }
    }

    let mut events = Vec::new();
    let mut skipped_tasks = 0usize;

    for task in tasks {
        let Some(valid) = eligible(task) else {
            skipped_tasks += 1;
            continue;
        };
        let Some(workers) = workers_by_task.get(&task.task_id) else {
            skipped_tasks += 1;
            continue;
        };

        for worker in workers {
            events.push(CleanEvent {
                worker_id: (*worker).to_string(),
                duration_minutes: valid.duration_minutes,
                property_id: valid.property_id,
                property_name: valid.property_name.to_string(),
                completed_at: valid.completed_at,
            });
        }
    }

    debug!(
        events = events.len(),
        skipped_tasks, skipped_assignments, "joined assignments to tasks"
    );
    events
}
