use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::WorkerPerformance;

#[derive(Debug, Clone, PartialEq)]
pub struct TeamSummary {
    pub workers: usize,
    pub total_cleans: usize,
    /// Clean-weighted average across ranked workers.
    pub avg_minutes: i64,
    pub fastest_worker: Option<String>,
}

pub fn summarize_team(workers: &[WorkerPerformance]) -> TeamSummary {
    let total_cleans: usize = workers.iter().map(|w| w.total_cleans).sum();
    let weighted: f64 = workers
        .iter()
        .map(|w| w.avg_minutes as f64 * w.total_cleans as f64)
        .sum();

    TeamSummary {
        workers: workers.len(),
        total_cleans,
        avg_minutes: if total_cleans == 0 {
            0
        } else {
            (weighted / total_cleans as f64).round() as i64
        },
        fastest_worker: workers
            .iter()
            .min_by_key(|w| w.avg_minutes)
            .map(|w| w.worker_name.clone()),
    }
}

pub fn score_line(worker: &WorkerPerformance) -> String {
    format!(
        "- {}: avg {} min (adjusted {}, median {}) across {} cleans, {}",
        worker.worker_name,
        worker.avg_minutes,
        worker.adjusted_avg_minutes,
        worker.median_minutes,
        worker.total_cleans,
        worker.trend_direction
    )
}

pub fn worker_detail(worker: &WorkerPerformance) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "### {}", worker.worker_name);
    let _ = writeln!(
        output,
        "- Average {} min, adjusted for property difficulty {} min",
        worker.avg_minutes, worker.adjusted_avg_minutes
    );
    let _ = writeln!(
        output,
        "- Median {} min, fastest {} min, slowest {} min, std dev {} min",
        worker.median_minutes, worker.fastest_minutes, worker.slowest_minutes, worker.std_dev_minutes
    );
    let _ = writeln!(
        output,
        "- {} cleans across {} properties, {}% on back-to-back days, trend {}",
        worker.total_cleans,
        worker.distinct_properties,
        worker.schedule_efficiency_pct,
        worker.trend_direction
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "Weekly averages:");
    for week in worker.weekly_trend.iter() {
        let _ = writeln!(output, "- week of {}: {} min", week.week_start, week.avg_minutes);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "By property:");
    for property in worker.by_property.iter() {
        let _ = writeln!(
            output,
            "- {} (#{}): {} cleans, avg {} min",
            property.property_name, property.property_id, property.count, property.avg_minutes
        );
    }

    output
}

pub fn build_report(since: NaiveDate, workers: &[WorkerPerformance]) -> String {
    let summary = summarize_team(workers);
    let mut output = String::new();

    let _ = writeln!(output, "# Housekeeping Performance Report");
    let _ = writeln!(output, "Cleans completed since {}", since);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Team Summary");

    if workers.is_empty() {
        let _ = writeln!(output, "No workers with enough cleans in this window.");
        return output;
    }

    let _ = writeln!(output, "- Workers ranked: {}", summary.workers);
    let _ = writeln!(output, "- Total cleans: {}", summary.total_cleans);
    let _ = writeln!(output, "- Team average: {} min", summary.avg_minutes);
    if let Some(name) = &summary.fastest_worker {
        let _ = writeln!(output, "- Fastest: {}", name);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Ranking");
    let _ = writeln!(
        output,
        "| Worker | Avg | Adjusted | Median | Cleans | Properties | Back-to-back | Trend |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
    for worker in workers.iter() {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} | {}% | {} |",
            worker.worker_name,
            worker.avg_minutes,
            worker.adjusted_avg_minutes,
            worker.median_minutes,
            worker.total_cleans,
            worker.distinct_properties,
            worker.schedule_efficiency_pct,
            worker.trend_direction
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Workers");
    for worker in workers.iter() {
        let _ = writeln!(output);
        output.push_str(&worker_detail(worker));
    }

    output
}
