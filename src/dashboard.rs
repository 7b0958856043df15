//! Read side for the teacher dashboard. Everything here is windowing and
//! delegation; the numbers come from [`crate::trend::aggregate`].

use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::{debug, error};

use crate::config::{EngagementBands, EngineConfig, TrendConfig};
use crate::error::{CoreError, NotFoundError};
use crate::models::{DateRange, Scope, WeeklyAggregate, WeeklyReflection};
use crate::store::ReflectionStore;
use crate::trend::{aggregate, week_start};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementStatus {
    Green,
    Yellow,
    Red,
}

impl EngagementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementStatus::Green => "green",
            EngagementStatus::Yellow => "yellow",
            EngagementStatus::Red => "red",
        }
    }
}

impl fmt::Display for EngagementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Engagement {
    pub status: EngagementStatus,
    pub mean_cei: f64,
    pub message: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub scope: Scope,
    pub weeks: Vec<WeeklyAggregate>,
    /// `None` until the window holds at least two sessions.
    pub engagement: Option<Engagement>,
    /// Teacher's own notes for the weeks in the window.
    pub reflections: Vec<WeeklyReflection>,
}

/// The calendar weeks covered by a window ending with the week containing `today`.
///
/// A window reaching back past the earliest representable date has no lower bound.
pub fn window_range(window_weeks: usize, today: NaiveDate, config: &TrendConfig) -> DateRange {
    let first_week = week_start(today, config.week_start);
    let start = i64::try_from(window_weeks.saturating_sub(1))
        .ok()
        .and_then(Duration::try_weeks)
        .and_then(|span| first_week.checked_sub_signed(span));
    DateRange {
        start,
        end: Some(today),
    }
}

/// Weekly aggregates for the last `window_weeks` calendar weeks of `scope`.
///
/// Fails with [`NotFoundError`] only when the scope has never had a record;
/// a scope whose sessions all fall outside the window yields an empty list.
pub async fn query<S: ReflectionStore + ?Sized>(
    store: &S,
    config: &TrendConfig,
    scope: &Scope,
    window_weeks: usize,
    today: NaiveDate,
) -> Result<Vec<WeeklyAggregate>, CoreError> {
    let range = window_range(window_weeks, today, config);
    let series = if window_weeks == 0 {
        Vec::new()
    } else {
        store.fetch_series(scope, range).await?
    };
    debug!(scope = %scope, window_weeks, sessions = series.len(), "dashboard window");

    if series.is_empty() {
        if store.record_count(scope).await? == 0 {
            return Err(NotFoundError {
                scope: scope.clone(),
            }
            .into());
        }
        return Ok(Vec::new());
    }

    aggregate(&series, window_weeks, config).map_err(|err| {
        error!(scope = %scope, "aggregation failed: {err}");
        CoreError::from(err)
    })
}

pub async fn overview<S: ReflectionStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    scope: &Scope,
    window_weeks: usize,
    today: NaiveDate,
) -> Result<Dashboard, CoreError> {
    let weeks = query(store, &config.trend, scope, window_weeks, today).await?;
    let engagement = interpret_engagement(&weeks, &config.engagement);
    let reflections = if window_weeks == 0 {
        Vec::new()
    } else {
        let range = window_range(window_weeks, today, &config.trend);
        store.weekly_reflections(scope, range).await?
    };
    Ok(Dashboard {
        scope: scope.clone(),
        weeks,
        engagement,
        reflections,
    })
}

/// Reads the session-weighted mean CEI of a window against the engagement bands.
pub fn interpret_engagement(
    weeks: &[WeeklyAggregate],
    bands: &EngagementBands,
) -> Option<Engagement> {
    let sessions: usize = weeks.iter().map(|week| week.session_count).sum();
    if sessions < 2 {
        return None;
    }
    let total: f64 = weeks
        .iter()
        .map(|week| week.mean_cei * week.session_count as f64)
        .sum();
    let mean_cei = total / sessions as f64;

    let (status, message) = if mean_cei >= bands.green_min {
        (
            EngagementStatus::Green,
            "Class is responding well. Keep your current approach.",
        )
    } else if mean_cei >= bands.yellow_min {
        (
            EngagementStatus::Yellow,
            "Engagement is fair. Small adjustments may help.",
        )
    } else {
        (
            EngagementStatus::Red,
            "Engagement is low. Consider changing pace or method.",
        )
    };

    Some(Engagement {
        status,
        mean_cei,
        message,
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::models::{CeiRecord, TrendLabel};
    use crate::store::MemoryStore;

    fn scope() -> Scope {
        Scope::new("t-01", "JSS2 Blue", "maths")
    }

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, month, day).unwrap()
    }

    async fn store_with(entries: &[(NaiveDate, f64)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (date, cei) in entries {
            store
                .save(&CeiRecord {
                    scope: scope(),
                    date: *date,
                    cei: *cei,
                    raw_input_id: Uuid::new_v4(),
                })
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn window_spans_whole_calendar_weeks() {
        let range = window_range(2, date(3, 12), &TrendConfig::default());
        assert_eq!(range, DateRange::between(date(3, 2), date(3, 12)));
    }

    #[test]
    fn oversized_window_has_no_lower_bound() {
        let today = date(3, 4);
        let range = window_range(20_000_000, today, &TrendConfig::default());
        assert_eq!(range, DateRange { start: None, end: Some(today) });
        let range = window_range(usize::MAX, today, &TrendConfig::default());
        assert_eq!(range.start, None);
        assert!(range.contains(NaiveDate::MIN));
    }

    #[tokio::test]
    async fn oversized_window_returns_whole_history() {
        let store = store_with(&[(date(1, 6), 70.0), (date(3, 2), 60.0)]).await;
        let weeks = query(&store, &TrendConfig::default(), &scope(), 20_000_000, date(3, 4))
            .await
            .unwrap();
        assert_eq!(weeks.len(), 2);
    }

    #[tokio::test]
    async fn never_recorded_scope_is_not_found() {
        let store = MemoryStore::new();
        let err = query(&store, &TrendConfig::default(), &scope(), 4, date(3, 12))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn sessions_outside_window_give_empty_result() {
        let store = store_with(&[(date(1, 6), 70.0)]).await;
        let weeks = query(&store, &TrendConfig::default(), &scope(), 2, date(3, 12))
            .await
            .unwrap();
        assert!(weeks.is_empty());
    }

    #[tokio::test]
    async fn delegates_to_aggregation_within_window() {
        let store = store_with(&[
            (date(2, 3), 40.0),
            (date(3, 2), 60.0),
            (date(3, 4), 65.0),
            (date(3, 10), 70.0),
        ])
        .await;
        let weeks = query(&store, &TrendConfig::default(), &scope(), 2, date(3, 12))
            .await
            .unwrap();
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].trend_label, TrendLabel::InsufficientData);
        assert_eq!(weeks[1].trend_delta, Some(7.5));
        assert_eq!(weeks[1].trend_label, TrendLabel::Rising);
    }

    #[tokio::test]
    async fn overview_interprets_window() {
        let store = store_with(&[(date(3, 2), 60.0), (date(3, 4), 65.0), (date(3, 10), 70.0)]).await;
        let dashboard = overview(&store, &EngineConfig::default(), &scope(), 4, date(3, 12))
            .await
            .unwrap();
        let engagement = dashboard.engagement.unwrap();
        assert_eq!(engagement.mean_cei, 65.0);
        assert_eq!(engagement.status, EngagementStatus::Yellow);
        assert_eq!(engagement.status.to_string(), "yellow");
        assert!(dashboard.reflections.is_empty());
    }

    #[tokio::test]
    async fn overview_carries_reflections_inside_window() {
        let store = store_with(&[(date(3, 2), 60.0), (date(3, 10), 70.0)]).await;
        for (week_start, text) in [(date(2, 2), "before the window"), (date(3, 9), "tried group work")] {
            store
                .save_weekly_reflection(&WeeklyReflection {
                    scope: scope(),
                    week_start,
                    reflection: text.to_string(),
                })
                .await
                .unwrap();
        }
        let dashboard = overview(&store, &EngineConfig::default(), &scope(), 2, date(3, 12))
            .await
            .unwrap();
        assert_eq!(dashboard.reflections.len(), 1);
        assert_eq!(dashboard.reflections[0].reflection, "tried group work");
    }

    #[test]
    fn single_session_is_not_interpreted() {
        let week = WeeklyAggregate {
            scope: scope(),
            week_start: date(3, 2),
            session_count: 1,
            mean_cei: 90.0,
            std_dev_cei: 0.0,
            trend_delta: None,
            trend_label: TrendLabel::InsufficientData,
        };
        assert!(interpret_engagement(&[week.clone()], &EngagementBands::default()).is_none());

        let busy = WeeklyAggregate {
            session_count: 3,
            ..week
        };
        let engagement = interpret_engagement(&[busy], &EngagementBands::default()).unwrap();
        assert_eq!(engagement.status, EngagementStatus::Green);
    }
}
