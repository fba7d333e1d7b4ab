use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Duration, NaiveDate};
use tracing::info;

use crate::join::join_assignments;
use crate::models::{
    AssignmentRow, CleanEvent, PropertyBreakdown, TaskRow, WeeklyAverage, WorkerPerformance,
};
use crate::{ranking, trend};

/// Historical average clean minutes per property.
pub type PropertyBaselines = HashMap<i64, f64>;

/// Cleans on the same day needed for that day to count as back-to-back.
pub const BACK_TO_BACK_MIN_CLEANS: usize = 2;

/// Runs the whole pipeline for one query window: join, aggregate, rank.
pub fn analyze(
    tasks: &[TaskRow],
    assignments: &[AssignmentRow],
    baselines: &PropertyBaselines,
) -> Vec<WorkerPerformance> {
    let events = join_assignments(tasks, assignments);
    let workers = aggregate(&events, baselines);
    let computed = workers.len();
    let ranked = ranking::rank(workers);

    info!(
        tasks = tasks.len(),
        events = events.len(),
        workers = computed,
        ranked = ranked.len(),
        "computed worker performance"
    );
    ranked
}

/// Computes the metric set for every worker with at least one event,
/// ordered by worker name.
pub fn aggregate(events: &[CleanEvent], baselines: &PropertyBaselines) -> Vec<WorkerPerformance> {
    let global_avg = mean(events.iter().map(|e| e.duration_minutes));

    let mut by_worker: BTreeMap<&str, Vec<&CleanEvent>> = BTreeMap::new();
    for event in events {
        by_worker.entry(event.worker_id.as_str()).or_default().push(event);
    }

    by_worker
        .into_iter()
        .filter_map(|(worker, events)| worker_performance(worker, &events, baselines, global_avg))
        .collect()
}

fn worker_performance(
    worker: &str,
    events: &[&CleanEvent],
    baselines: &PropertyBaselines,
    global_avg: f64,
) -> Option<WorkerPerformance> {
    let mut sorted_times: Vec<f64> = events.iter().map(|e| e.duration_minutes).collect();
    sorted_times.sort_by(f64::total_cmp);

    let n = sorted_times.len();
    let fastest_minutes = *sorted_times.first()?;
    let slowest_minutes = sorted_times[n - 1];

    let avg = mean(sorted_times.iter().copied());
    let weekly_trend = weekly_trend(events);
    let by_property = by_property(events);

    Some(WorkerPerformance {
        worker_name: worker.to_string(),
        avg_minutes: round_minutes(avg),
        adjusted_avg_minutes: round_minutes(adjusted_average(events, baselines, global_avg)),
        median_minutes: round_minutes(middle_element(&sorted_times)),
        fastest_minutes,
        slowest_minutes,
        std_dev_minutes: round_minutes(population_std_dev(&sorted_times, avg)),
        total_cleans: n,
        distinct_properties: by_property.len(),
        trend_direction: trend::classify(&weekly_trend),
        weekly_trend,
        schedule_efficiency_pct: schedule_efficiency_pct(events),
        by_property,
    })
}

pub fn round_minutes(value: f64) -> i64 {
    value.round() as i64
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Element at `n / 2` of an ascending slice: the upper of the two middle
/// values for even lengths, never their average.
pub fn middle_element(sorted: &[f64]) -> f64 {
    sorted.get(sorted.len() / 2).copied().unwrap_or(0.0)
}

/// Population standard deviation (divides by n).
pub fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Mean duration after rescaling each clean onto a common difficulty footing.
///
/// A clean at a property with a positive baseline contributes
/// `duration / baseline * global_avg`; anything else contributes its raw
/// duration. With no global average there is nothing to rescale against.
pub fn adjusted_average(
    events: &[&CleanEvent],
    baselines: &PropertyBaselines,
    global_avg: f64,
) -> f64 {
    mean(events.iter().map(|event| {
        match baselines.get(&event.property_id) {
            Some(&baseline) if baseline > 0.0 && global_avg > 0.0 => {
                event.duration_minutes / baseline * global_avg
            }
            _ => event.duration_minutes,
        }
    }))
}

/// Monday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn weekly_trend(events: &[&CleanEvent]) -> Vec<WeeklyAverage> {
    let mut weeks: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for event in events {
        weeks
            .entry(week_start(event.completed_at.date_naive()))
            .or_default()
            .push(event.duration_minutes);
    }

    weeks
        .into_iter()
        .map(|(week_start, durations)| WeeklyAverage {
            week_start,
            avg_minutes: round_minutes(mean(durations.into_iter())),
        })
        .collect()
}

fn by_property(events: &[&CleanEvent]) -> Vec<PropertyBreakdown> {
    let mut groups: BTreeMap<i64, (&str, Vec<f64>)> = BTreeMap::new();
    for event in events {
        groups
            .entry(event.property_id)
            .or_insert_with(|| (event.property_name.as_str(), Vec::new()))
            .1
            .push(event.duration_minutes);
    }

    let mut breakdown: Vec<PropertyBreakdown> = groups
        .into_iter()
        .map(|(property_id, (name, durations))| PropertyBreakdown {
            property_id,
            property_name: name.to_string(),
            count: durations.len(),
            avg_minutes: round_minutes(mean(durations.into_iter())),
        })
        .collect();

    // stable sort keeps ascending property_id within equal counts
    breakdown.sort_by(|a, b| b.count.cmp(&a.count));
    breakdown
}

/// Share of cleans that fell on a day with at least two cleans, 0-100.
pub fn schedule_efficiency_pct(events: &[&CleanEvent]) -> u32 {
    if events.is_empty() {
        return 0;
    }

    let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for event in events {
        *per_day.entry(event.completed_at.date_naive()).or_insert(0) += 1;
    }

    let back_to_back: usize = per_day
        .values()
        .filter(|count| **count >= BACK_TO_BACK_MIN_CLEANS)
        .sum();

    (100.0 * back_to_back as f64 / events.len() as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrendDirection;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, month, day, hour, 0, 0).unwrap()
    }

    fn clean(worker: &str, property_id: i64, minutes: f64, completed_at: DateTime<Utc>) -> CleanEvent {
        CleanEvent {
            worker_id: worker.to_string(),
            duration_minutes: minutes,
            property_id,
            property_name: format!("Property {property_id}"),
            completed_at,
        }
    }

    fn alice_week() -> Vec<CleanEvent> {
        vec![
            clean("Alice", 1, 80.0, at(1, 5, 10)),
            clean("Alice", 1, 120.0, at(1, 6, 10)),
            clean("Alice", 2, 150.0, at(1, 7, 10)),
            clean("Alice", 2, 50.0, at(1, 8, 10)),
        ]
    }

    #[test]
    fn single_week_scenario() {
        let baselines = PropertyBaselines::from([(1, 100.0)]);
        let workers = aggregate(&alice_week(), &baselines);
        assert_eq!(workers.len(), 1);

        let alice = &workers[0];
        assert_eq!(alice.total_cleans, 4);
        assert_eq!(alice.avg_minutes, 100);
        assert_eq!(alice.median_minutes, 120);
        assert_eq!(alice.fastest_minutes, 50.0);
        assert_eq!(alice.slowest_minutes, 150.0);
        assert_eq!(alice.distinct_properties, 2);
        assert_eq!(alice.weekly_trend.len(), 1);
        assert_eq!(alice.trend_direction, TrendDirection::Stable);
        assert_eq!(alice.by_property.len(), 2);
        for (entry, id) in alice.by_property.iter().zip([1, 2]) {
            assert_eq!(entry.property_id, id);
            assert_eq!(entry.count, 2);
            assert_eq!(entry.avg_minutes, 100);
        }
    }

    #[test]
    fn median_takes_element_at_half_length() {
        assert_eq!(middle_element(&[10.0, 20.0, 30.0, 40.0]), 30.0);
        assert_eq!(middle_element(&[10.0, 20.0, 30.0]), 20.0);
        assert_eq!(middle_element(&[]), 0.0);
    }

    #[test]
    fn std_dev_uses_population_variance() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(population_std_dev(&values, 5.0), 2.0);
        assert_eq!(population_std_dev(&[], 0.0), 0.0);
    }

    #[test]
    fn baseline_rescales_each_clean() {
        let event = clean("Alice", 1, 80.0, at(1, 5, 10));
        let baselines = PropertyBaselines::from([(1, 100.0)]);
        let adjusted = adjusted_average(&[&event], &baselines, 90.0);
        assert!((adjusted - 72.0).abs() < 1e-9);
    }

    #[test]
    fn missing_baselines_leave_average_unchanged() {
        let events = vec![
            clean("Bruno", 3, 45.0, at(1, 5, 9)),
            clean("Bruno", 4, 61.0, at(1, 6, 9)),
            clean("Bruno", 4, 70.0, at(1, 7, 9)),
        ];
        let baselines = PropertyBaselines::from([(3, 0.0)]);
        let bruno = &aggregate(&events, &baselines)[0];
        assert_eq!(bruno.adjusted_avg_minutes, bruno.avg_minutes);
    }

    #[test]
    fn global_average_spans_all_workers() {
        let mut events = alice_week();
        events.push(clean("Bruno", 2, 40.0, at(1, 5, 12)));
        // global average = (400 + 40) / 5 = 88
        let baselines = PropertyBaselines::from([(1, 100.0)]);
        let workers = aggregate(&events, &baselines);
        let alice = workers.iter().find(|w| w.worker_name == "Alice").unwrap();
        // (70.4 + 105.6 + 150 + 50) / 4 = 94
        assert_eq!(alice.adjusted_avg_minutes, 94);
    }

    #[test]
    fn weeks_start_on_monday() {
        let sunday = NaiveDate::from_ymd_opt(2026, 1, 11).unwrap();
        let monday = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(week_start(sunday), monday);
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn weekly_trend_is_sorted_and_classified() {
        let events = vec![
            clean("Cara", 1, 60.0, at(1, 26, 9)),
            clean("Cara", 1, 100.0, at(1, 5, 9)),
            clean("Cara", 1, 100.0, at(1, 12, 9)),
            clean("Cara", 1, 60.0, at(1, 19, 9)),
            clean("Cara", 1, 100.0, at(1, 13, 9)),
        ];
        let cara = &aggregate(&events, &PropertyBaselines::new())[0];
        let starts: Vec<u32> = cara.weekly_trend.iter().map(|w| w.week_start.day()).collect();
        assert_eq!(starts, vec![5, 12, 19, 26]);
        assert_eq!(cara.trend_direction, TrendDirection::Improving);
    }

    #[test]
    fn property_breakdown_orders_by_count() {
        let events = vec![
            clean("Dana", 9, 30.0, at(1, 5, 9)),
            clean("Dana", 4, 30.0, at(1, 6, 9)),
            clean("Dana", 4, 50.0, at(1, 7, 9)),
            clean("Dana", 2, 30.0, at(1, 8, 9)),
        ];
        let dana = &aggregate(&events, &PropertyBaselines::new())[0];
        let ids: Vec<i64> = dana.by_property.iter().map(|p| p.property_id).collect();
        assert_eq!(ids, vec![4, 2, 9]);
        assert_eq!(dana.by_property[0].avg_minutes, 40);
    }

    #[test]
    fn schedule_efficiency_counts_back_to_back_days() {
        let one_per_day = vec![
            clean("Eli", 1, 30.0, at(1, 5, 9)),
            clean("Eli", 1, 30.0, at(1, 6, 9)),
            clean("Eli", 1, 30.0, at(1, 7, 9)),
        ];
        let refs: Vec<&CleanEvent> = one_per_day.iter().collect();
        assert_eq!(schedule_efficiency_pct(&refs), 0);

        let doubled = vec![
            clean("Eli", 1, 30.0, at(1, 5, 9)),
            clean("Eli", 2, 30.0, at(1, 5, 13)),
            clean("Eli", 1, 30.0, at(1, 6, 9)),
            clean("Eli", 2, 30.0, at(1, 6, 15)),
        ];
        let refs: Vec<&CleanEvent> = doubled.iter().collect();
        assert_eq!(schedule_efficiency_pct(&refs), 100);

        let mixed = vec![
            clean("Eli", 1, 30.0, at(1, 5, 9)),
            clean("Eli", 2, 30.0, at(1, 5, 13)),
            clean("Eli", 1, 30.0, at(1, 6, 9)),
        ];
        let refs: Vec<&CleanEvent> = mixed.iter().collect();
        assert_eq!(schedule_efficiency_pct(&refs), 67);
        assert_eq!(schedule_efficiency_pct(&[]), 0);
    }

    #[test]
    fn analyze_is_repeatable() {
        let tasks: Vec<TaskRow> = (1..=4)
            .map(|id| TaskRow {
                task_id: id,
                duration_minutes: Some(30.0 + id as f64 * 10.0),
                property_id: Some(id % 2),
                property_name: Some(format!("Unit {}", id % 2)),
                completed_at: Some(at(1, 5 + id as u32, 11)),
                status: Some("finished".to_string()),
            })
            .collect();
        let assignments: Vec<AssignmentRow> = (1..=4)
            .flat_map(|id| {
                ["Alice", "Bruno"].map(|worker| AssignmentRow {
                    task_id: Some(id),
                    worker_name: Some(worker.to_string()),
                })
            })
            .collect();
        let baselines = PropertyBaselines::from([(1, 45.0)]);

        let first = analyze(&tasks, &assignments, &baselines);
        let second = analyze(&tasks, &assignments, &baselines);
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
