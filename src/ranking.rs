use tracing::debug;

use crate::models::WorkerPerformance;

pub const MIN_CLEANS: usize = 3;
/// Averages below this are placeholder or test tasks.
pub const MIN_AVG_MINUTES: i64 = 5;

pub fn is_reliable(worker: &WorkerPerformance) -> bool {
    worker.total_cleans >= MIN_CLEANS && worker.avg_minutes >= MIN_AVG_MINUTES
}

/// Drops unreliable workers and orders the rest fastest first.
pub fn rank(workers: Vec<WorkerPerformance>) -> Vec<WorkerPerformance> {
    let mut values: Vec<WorkerPerformance> = workers
        .into_iter()
        .filter(|worker| {
            let keep = is_reliable(worker);
            if !keep {
                debug!(
                    worker = %worker.worker_name,
                    cleans = worker.total_cleans,
                    avg_minutes = worker.avg_minutes,
                    "excluding worker from ranking"
                );
            }
            keep
        })
        .collect();

    values.sort_by(|a, b| {
        a.avg_minutes
            .cmp(&b.avg_minutes)
            .then_with(|| a.worker_name.cmp(&b.worker_name))
    });
    values
}
