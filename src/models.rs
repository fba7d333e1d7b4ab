use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

/// A housekeeping task as it comes out of the store. Every column may be null.
#[derive(Debug, Clone, Default)]
pub struct TaskRow {
    pub task_id: i64,
    pub duration_minutes: Option<f64>,
    pub property_id: Option<i64>,
    pub property_name: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentRow {
    pub task_id: Option<i64>,
    pub worker_name: Option<String>,
}

/// One worker's completion of one finished task.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanEvent {
    pub worker_id: String,
    pub duration_minutes: f64,
    pub property_id: i64,
    pub property_name: String,
    pub completed_at: DateTime<Utc>,
}

/// Half-open `[start, end)` range of completion times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QueryWindow {
    /// Window from midnight UTC `days` days ago up to now.
    pub fn last_days(days: i64) -> Self {
        let now = Utc::now();
        Self {
            start: cutoff_date(now.date_naive(), days)
                .and_time(NaiveTime::MIN)
                .and_utc(),
            end: now,
        }
    }
}

pub fn cutoff_date(today: NaiveDate, since_days: i64) -> NaiveDate {
    today - Duration::days(since_days.max(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Worsening,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Stable => "stable",
            TrendDirection::Worsening => "worsening",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyAverage {
    pub week_start: NaiveDate,
    pub avg_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyBreakdown {
    pub property_id: i64,
    pub property_name: String,
    pub count: usize,
    pub avg_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerPerformance {
    pub worker_name: String,
    pub avg_minutes: i64,
    pub adjusted_avg_minutes: i64,
    pub median_minutes: i64,
    pub fastest_minutes: f64,
    pub slowest_minutes: f64,
    pub std_dev_minutes: i64,
    pub total_cleans: usize,
    pub distinct_properties: usize,
    pub weekly_trend: Vec<WeeklyAverage>,
    pub trend_direction: TrendDirection,
    pub schedule_efficiency_pct: u32,
    pub by_property: Vec<PropertyBreakdown>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_date_respects_since_days() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        assert_eq!(cutoff_date(today, 14), NaiveDate::from_ymd_opt(2026, 1, 19).unwrap());
        assert_eq!(cutoff_date(today, 0), NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
    }

    #[test]
    fn window_starts_at_midnight() {
        let window = QueryWindow::last_days(7);
        assert_eq!(window.start.time(), NaiveTime::MIN);
        assert!(window.start < window.end);
    }

    #[test]
    fn trend_direction_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TrendDirection::Worsening).unwrap(),
            "\"worsening\""
        );
        assert_eq!(TrendDirection::Improving.to_string(), "improving");
    }
}
