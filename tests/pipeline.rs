//! Submission through dashboard, end to end over the public API.

use chrono::NaiveDate;

use class_engagement_index::dashboard::{self, EngagementStatus};
use class_engagement_index::db::SqliteStore;
use class_engagement_index::models::{RatingValue, TaskGiven, TrendLabel};
use class_engagement_index::report::build_report;
use class_engagement_index::submit::{reflect_on_week, retract, setup_class, submit};
use class_engagement_index::{
    CoreError, DailyReflectionInput, EngineConfig, MemoryStore, ReflectionStore, Scope,
};

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, month, day).unwrap()
}

fn scope() -> Scope {
    Scope::new("t-07", "SS1 Green", "chemistry")
}

fn reflection(day: NaiveDate, values: [i64; 5]) -> DailyReflectionInput {
    DailyReflectionInput::new(scope(), day)
        .with_score("participation", values[0])
        .with_score("attentiveness", values[1])
        .with_score("energy", values[2])
        .with_score("understanding", values[3])
        .with_score("disruption", values[4])
}

async fn run_pipeline<S: ReflectionStore>(store: &S) {
    let config = EngineConfig::default();
    let today = date(3, 20);

    // Week of 2026-03-02: CEI 50.0 and 55.0. Week of 2026-03-16: CEI 100.0.
    submit(store, &config, reflection(date(3, 2), [3, 4, 2, 3, 3]), today)
        .await
        .unwrap();
    let wrong = submit(store, &config, reflection(date(3, 4), [1, 1, 1, 1, 5]), today)
        .await
        .unwrap();
    submit(store, &config, reflection(date(3, 18), [5, 5, 5, 5, 1]), today)
        .await
        .unwrap();

    let err = submit(store, &config, reflection(date(3, 4), [4, 3, 3, 2, 2]), today)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    retract(store, wrong.id).await.unwrap();
    let corrected = submit(store, &config, reflection(date(3, 4), [4, 3, 3, 2, 2]), today)
        .await
        .unwrap();
    assert_eq!(corrected.record.cei, 55.0);

    let weeks = dashboard::query(store, &config.trend, &scope(), 4, today)
        .await
        .unwrap();
    assert_eq!(weeks.len(), 2);
    assert_eq!(weeks[0].mean_cei, 52.5);
    assert_eq!(weeks[0].trend_label, TrendLabel::InsufficientData);
    assert_eq!(weeks[1].trend_delta, Some(47.5));
    assert_eq!(weeks[1].trend_label, TrendLabel::Rising);

    let again = dashboard::query(store, &config.trend, &scope(), 4, today)
        .await
        .unwrap();
    assert_eq!(weeks, again);

    let overview = dashboard::overview(store, &config, &scope(), 4, today)
        .await
        .unwrap();
    assert_eq!(
        overview.engagement.map(|e| e.status),
        Some(EngagementStatus::Yellow)
    );

    let later = date(6, 1);
    let empty = dashboard::query(store, &config.trend, &scope(), 2, later)
        .await
        .unwrap();
    assert!(empty.is_empty());

    let other = Scope::new("t-07", "SS1 Green", "physics");
    let err = dashboard::query(store, &config.trend, &other, 4, today)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

fn form_entry(day: NaiveDate, level: &str, present: i64) -> DailyReflectionInput {
    let mut entry = DailyReflectionInput::new(scope(), day)
        .with_rating("participation_level", RatingValue::Level(level.into()))
        .with_rating("attentiveness_level", RatingValue::Level(level.into()))
        .with_score("number_present", present);
    entry.task_given = Some(TaskGiven::Assignment);
    entry
}

async fn run_classroom_form<S: ReflectionStore>(store: &S) {
    let config = EngineConfig::classroom_form();
    let today = date(3, 13);
    setup_class(store, &scope(), 40).await.unwrap();

    // 40 + 40 + 20 * 36/40 = 98.0, then 20 + 20 + 20 * 20/40 = 50.0
    submit(store, &config, form_entry(date(3, 2), "high", 36), today)
        .await
        .unwrap();
    submit(store, &config, form_entry(date(3, 10), "medium", 20), today)
        .await
        .unwrap();
    reflect_on_week(store, &config.trend, scope(), date(3, 12), "mock exams drained them", today)
        .await
        .unwrap();

    let overview = dashboard::overview(store, &config, &scope(), 4, today)
        .await
        .unwrap();
    assert_eq!(overview.weeks.len(), 2);
    assert_eq!(overview.weeks[0].mean_cei, 98.0);
    assert_eq!(overview.weeks[1].trend_delta, Some(-48.0));
    assert_eq!(overview.weeks[1].trend_label, TrendLabel::Falling);
    assert_eq!(overview.reflections.len(), 1);
    assert_eq!(overview.reflections[0].week_start, date(3, 9));

    let report = build_report(&overview, 4, today);
    assert!(report.contains("Average CEI 74.0 (yellow)"));
    assert!(report.contains("- Week of 2026-03-09: mock exams drained them"));
}

#[tokio::test]
async fn classroom_form_over_memory_store() {
    run_classroom_form(&MemoryStore::new()).await;
}

#[tokio::test]
async fn classroom_form_over_sqlite_store() {
    let store = SqliteStore::in_memory().await.unwrap();
    run_classroom_form(&store).await;
}

#[tokio::test]
async fn pipeline_over_memory_store() {
    run_pipeline(&MemoryStore::new()).await;
}

#[tokio::test]
async fn pipeline_over_sqlite_store() {
    let store = SqliteStore::in_memory().await.unwrap();
    run_pipeline(&store).await;
}
