use crate::models::{TrendDirection, WeeklyAverage};

/// Minimum number of weekly buckets before a direction is reported.
pub const MIN_WEEKS: usize = 4;
/// Relative change that must be exceeded before the label moves off stable.
pub const CHANGE_THRESHOLD: f64 = 0.10;

/// Compares the last two weeks against the two before them.
///
/// Falling times mean the worker is improving.
pub fn classify(weekly: &[WeeklyAverage]) -> TrendDirection {
    if weekly.len() < MIN_WEEKS {
        return TrendDirection::Stable;
    }

    let n = weekly.len();
    let recent_avg = pair_mean(&weekly[n - 2..]);
    let earlier_avg = pair_mean(&weekly[n - 4..n - 2]);

    if earlier_avg == 0.0 {
        return TrendDirection::Stable;
    }

    let change = (recent_avg - earlier_avg) / earlier_avg;
    if change < -CHANGE_THRESHOLD {
        TrendDirection::Improving
    } else if change > CHANGE_THRESHOLD {
        TrendDirection::Worsening
    } else {
        TrendDirection::Stable
    }
}

fn pair_mean(weeks: &[WeeklyAverage]) -> f64 {
    weeks.iter().map(|w| w.avg_minutes as f64).sum::<f64>() / weeks.len() as f64
}
