//! Weekly trend aggregation over a single scope's CEI series.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::config::TrendConfig;
use crate::error::AggregationError;
use crate::models::{CeiRecord, TrendLabel, WeeklyAggregate};

/// First day of the week bucket containing `date`.
pub fn week_start(date: NaiveDate, anchor: Weekday) -> NaiveDate {
    let offset = (date.weekday().num_days_from_monday() + 7 - anchor.num_days_from_monday()) % 7;
    date - Duration::days(i64::from(offset))
}

pub fn label_for(delta: Option<f64>, threshold: f64) -> TrendLabel {
    match delta {
        None => TrendLabel::InsufficientData,
        Some(delta) if delta > threshold => TrendLabel::Rising,
        Some(delta) if delta < -threshold => TrendLabel::Falling,
        Some(_) => TrendLabel::Stable,
    }
}

/// Groups an ascending single-scope series into week buckets and returns the
/// most recent `window_weeks` non-empty weeks, oldest first.
///
/// Means, deviations and deltas keep full precision; rounding is left to
/// whatever renders them. Trend deltas compare each week against the previous non-empty week inside
/// the returned window, so the first returned week never carries a delta.
pub fn aggregate(
    series: &[CeiRecord],
    window_weeks: usize,
    config: &TrendConfig,
) -> Result<Vec<WeeklyAggregate>, AggregationError> {
    let Some(first) = series.first() else {
        return Ok(Vec::new());
    };

    let mut buckets: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
    let mut previous_date = first.date;
    for record in series {
        if record.scope != first.scope {
            return Err(AggregationError::MixedScope {
                expected: first.scope.clone(),
                found: record.scope.clone(),
            });
        }
        if record.date < previous_date {
            return Err(AggregationError::Unsorted {
                previous: previous_date,
                next: record.date,
            });
        }
        previous_date = record.date;

        let bucket = week_start(record.date, config.week_start);
        match buckets.last_mut() {
            Some((start, values)) if *start == bucket => values.push(record.cei),
            _ => buckets.push((bucket, vec![record.cei])),
        }
    }

    let skip = buckets.len().saturating_sub(window_weeks);
    let mut weeks = Vec::with_capacity(buckets.len() - skip);
    let mut previous_mean: Option<f64> = None;

    for (week_start, values) in buckets.into_iter().skip(skip) {
        let mean_cei = mean(&values);
        let trend_delta = previous_mean.map(|prev| mean_cei - prev);
        weeks.push(WeeklyAggregate {
            scope: first.scope.clone(),
            week_start,
            session_count: values.len(),
            mean_cei,
            std_dev_cei: sample_std_dev(&values),
            trend_delta,
            trend_label: label_for(trend_delta, config.threshold),
        });
        previous_mean = Some(mean_cei);
    }

    Ok(weeks)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample (n - 1) standard deviation; zero for a single session.
fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
