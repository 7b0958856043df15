use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use crate::config::{EngineConfig, FieldRange, FieldSpec};
use crate::error::{ConflictError, CoreError, StoreError};
use crate::models::{
    CeiRecord, DailyReflectionInput, DateRange, RatingValue, RecordId, Scope, WeeklyReflection,
};
use crate::store::ReflectionStore;
use crate::submit::{setup_class, submit};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://teacher_engagement.db?mode=rwc";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Single-connection in-memory database, schema applied.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_db().await?;
        Ok(store)
    }

    pub async fn init_db(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn existing_id(&self, record: &CeiRecord) -> Result<Option<RecordId>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id FROM cei_records
            WHERE teacher_id = ? AND class_id = ? AND subject_id = ? AND session_date = ?
            "#,
        )
        .bind(&record.scope.teacher_id)
        .bind(&record.scope.class_id)
        .bind(&record.scope.subject_id)
        .bind(record.date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| RecordId(row.get("id"))))
    }

    fn conflict(record: &CeiRecord, existing: RecordId) -> StoreError {
        ConflictError {
            scope: record.scope.clone(),
            date: record.date,
            existing,
        }
        .into()
    }
}

#[async_trait]
impl ReflectionStore for SqliteStore {
    async fn save(&self, record: &CeiRecord) -> Result<RecordId, StoreError> {
        if let Some(existing) = self.existing_id(record).await? {
            return Err(Self::conflict(record, existing));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO cei_records
            (teacher_id, class_id, subject_id, session_date, cei, raw_input_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.scope.teacher_id)
        .bind(&record.scope.class_id)
        .bind(&record.scope.subject_id)
        .bind(record.date)
        .bind(record.cei)
        .bind(record.raw_input_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(RecordId(done.last_insert_rowid())),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                match self.existing_id(record).await? {
                    Some(existing) => Err(Self::conflict(record, existing)),
                    None => Err(sqlx::Error::Database(db_err).into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn fetch_series(
        &self,
        scope: &Scope,
        range: DateRange,
    ) -> Result<Vec<CeiRecord>, StoreError> {
        let mut query = String::from(
            "SELECT session_date, cei, raw_input_id FROM cei_records \
             WHERE teacher_id = ? AND class_id = ? AND subject_id = ?",
        );
        if range.start.is_some() {
            query.push_str(" AND session_date >= ?");
        }
        if range.end.is_some() {
            query.push_str(" AND session_date <= ?");
        }
        query.push_str(" ORDER BY session_date ASC");

        let mut rows = sqlx::query(&query)
            .bind(&scope.teacher_id)
            .bind(&scope.class_id)
            .bind(&scope.subject_id);
        if let Some(start) = range.start {
            rows = rows.bind(start);
        }
        if let Some(end) = range.end {
            rows = rows.bind(end);
        }

        let records = rows.fetch_all(&self.pool).await?;
        let mut series = Vec::with_capacity(records.len());
        for row in records {
            series.push(CeiRecord {
                scope: scope.clone(),
                date: row.try_get("session_date")?,
                cei: row.try_get("cei")?,
                raw_input_id: row.try_get("raw_input_id")?,
            });
        }
        Ok(series)
    }

    async fn retract(&self, id: RecordId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM cei_records WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownRecord(id));
        }
        Ok(())
    }

    async fn record_count(&self, scope: &Scope) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM cei_records
            WHERE teacher_id = ? AND class_id = ? AND subject_id = ?
            "#,
        )
        .bind(&scope.teacher_id)
        .bind(&scope.class_id)
        .bind(&scope.subject_id)
        .fetch_one(&self.pool)
        .await?
        .try_get("count")?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn scopes(&self, teacher_id: &str) -> Result<Vec<Scope>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT class_id, subject_id FROM cei_records
            WHERE teacher_id = ?
            ORDER BY class_id, subject_id
            "#,
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scopes = Vec::with_capacity(rows.len());
        for row in rows {
            scopes.push(Scope {
                teacher_id: teacher_id.to_string(),
                class_id: row.try_get("class_id")?,
                subject_id: row.try_get("subject_id")?,
            });
        }
        Ok(scopes)
    }

    async fn archive_input(&self, input: &DailyReflectionInput) -> Result<(), StoreError> {
        let payload = serde_json::to_string(input)?;
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO reflection_inputs
            (id, teacher_id, class_id, subject_id, session_date, payload)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.id)
        .bind(&input.scope.teacher_id)
        .bind(&input.scope.class_id)
        .bind(&input.scope.subject_id)
        .bind(input.session_date)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_class_size(&self, scope: &Scope, class_size: u32) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO classes (teacher_id, class_id, class_size)
            VALUES (?, ?, ?)
            ON CONFLICT (teacher_id, class_id)
            DO UPDATE SET class_size = excluded.class_size, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&scope.teacher_id)
        .bind(&scope.class_id)
        .bind(i64::from(class_size))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn class_size(&self, scope: &Scope) -> Result<Option<u32>, StoreError> {
        let row = sqlx::query(
            "SELECT class_size FROM classes WHERE teacher_id = ? AND class_id = ?",
        )
        .bind(&scope.teacher_id)
        .bind(&scope.class_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let size: i64 = row.try_get("class_size")?;
                Ok(u32::try_from(size).ok())
            }
            None => Ok(None),
        }
    }

    async fn save_weekly_reflection(
        &self,
        reflection: &WeeklyReflection,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO weekly_reflections
            (teacher_id, class_id, subject_id, week_start, reflection)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (teacher_id, class_id, subject_id, week_start)
            DO UPDATE SET reflection = excluded.reflection, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&reflection.scope.teacher_id)
        .bind(&reflection.scope.class_id)
        .bind(&reflection.scope.subject_id)
        .bind(reflection.week_start)
        .bind(&reflection.reflection)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn weekly_reflections(
        &self,
        scope: &Scope,
        range: DateRange,
    ) -> Result<Vec<WeeklyReflection>, StoreError> {
        let mut query = String::from(
            "SELECT week_start, reflection FROM weekly_reflections \
             WHERE teacher_id = ? AND class_id = ? AND subject_id = ?",
        );
        if range.start.is_some() {
            query.push_str(" AND week_start >= ?");
        }
        if range.end.is_some() {
            query.push_str(" AND week_start <= ?");
        }
        query.push_str(" ORDER BY week_start ASC");

        let mut rows = sqlx::query(&query)
            .bind(&scope.teacher_id)
            .bind(&scope.class_id)
            .bind(&scope.subject_id);
        if let Some(start) = range.start {
            rows = rows.bind(start);
        }
        if let Some(end) = range.end {
            rows = rows.bind(end);
        }

        let mut reflections = Vec::new();
        for row in rows.fetch_all(&self.pool).await? {
            reflections.push(WeeklyReflection {
                scope: scope.clone(),
                week_start: row.try_get("week_start")?,
                reflection: row.try_get("reflection")?,
            });
        }
        Ok(reflections)
    }
}

const SEED_TEACHER: &str = "demo-teacher";
const SEED_CLASSES: [(&str, &str); 2] = [("JSS2 Blue", "mathematics"), ("JSS1 Gold", "basic science")];
/// Engagement level for each Monday/Wednesday/Friday session, oldest week first.
const SEED_LEVELS: [[f64; 3]; 4] = [
    [0.50, 0.60, 0.55],
    [0.65, 0.70, 0.60],
    [0.75, 0.80, 0.70],
    [0.85, 0.80, 0.90],
];

const SEED_CLASS_SIZE: u32 = 30;

/// Submits four weeks of demo reflections ending at `today`. Returns how many were new.
///
/// Classes get a roster first when the configuration scores attendance.
pub async fn seed<S: ReflectionStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    today: NaiveDate,
) -> Result<usize, CoreError> {
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let mut inserted = 0usize;

    for (class_offset, (class_id, subject_id)) in SEED_CLASSES.iter().enumerate() {
        let scope = Scope::new(SEED_TEACHER, *class_id, *subject_id);
        if config.needs_roster() {
            setup_class(store, &scope, SEED_CLASS_SIZE).await?;
        }
        for (week, levels) in SEED_LEVELS.iter().enumerate() {
            let week_monday = monday - Duration::weeks(3 - week as i64);
            for (slot, level) in levels.iter().enumerate() {
                let date = week_monday + Duration::days(2 * slot as i64);
                if date > today {
                    continue;
                }
                // The second class runs a little cooler than the first.
                let level = (level - 0.15 * class_offset as f64).clamp(0.0, 1.0);
                let mut input = DailyReflectionInput::new(scope.clone(), date)
                    .with_note(format!("seeded session {}", week * 3 + slot + 1));
                for spec in &config.fields {
                    input = input.with_rating(spec.name.clone(), rating_at(spec, level, SEED_CLASS_SIZE));
                }

                match submit(store, config, input, today).await {
                    Ok(_) => inserted += 1,
                    Err(CoreError::Conflict(_)) => {}
                    Err(err) => return Err(err),
                }
            }
        }
    }

    info!(inserted, "seed data submitted");
    Ok(inserted)
}

/// Raw rating sitting at `level` (0..=1 engagement) within the field's range.
fn rating_at(spec: &FieldSpec, level: f64, class_size: u32) -> RatingValue {
    let position = if spec.invert { 1.0 - level } else { level };
    match &spec.range {
        FieldRange::Scale { min, max } => {
            let span = (max - min) as f64;
            RatingValue::Score(min + (position * span).round() as i64)
        }
        FieldRange::Levels { levels } => {
            let last = levels.len().saturating_sub(1);
            let index = ((position * last as f64).round() as usize).min(last);
            RatingValue::Level(levels.get(index).cloned().unwrap_or_default())
        }
        FieldRange::Attendance => {
            RatingValue::Score((position * f64::from(class_size)).round() as i64)
        }
    }
}
