use std::io::Read;

use anyhow::{anyhow, bail, Context};
use chrono::NaiveDate;
use tracing::warn;

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::models::{DailyReflectionInput, RatingValue, Scope, TaskGiven};
use crate::store::ReflectionStore;
use crate::submit::submit;

const SCOPE_COLUMNS: [&str; 3] = ["teacher_id", "class_id", "subject_id"];
const DATE_COLUMN: &str = "session_date";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

/// Parses reflection rows. Columns other than scope, date, task_given, topic
/// and note are ratings. An empty session date is left for validation to report.
pub fn parse_reflections<R: Read>(reader: R) -> anyhow::Result<Vec<DailyReflectionInput>> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();

    for required in SCOPE_COLUMNS.iter().chain([DATE_COLUMN].iter()) {
        if !headers.iter().any(|h| h.trim() == *required) {
            bail!("CSV is missing the {required} column");
        }
    }

    let mut inputs = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("failed to read CSV row {line}"))?;

        let mut scope = Scope::new("", "", "");
        let mut session_date = None;
        let mut note = None;
        let mut topic = None;
        let mut task_given = None;
        let mut ratings = Vec::new();

        for (header, cell) in headers.iter().zip(row.iter()) {
            let header = header.trim();
            let cell = cell.trim();
            match header {
                "teacher_id" => scope.teacher_id = cell.to_string(),
                "class_id" => scope.class_id = cell.to_string(),
                "subject_id" => scope.subject_id = cell.to_string(),
                DATE_COLUMN if !cell.is_empty() => {
                    let date = NaiveDate::parse_from_str(cell, "%Y-%m-%d")
                        .with_context(|| format!("row {line}: invalid session_date {cell}"))?;
                    session_date = Some(date);
                }
                _ if cell.is_empty() => {}
                "note" => note = Some(cell.to_string()),
                "topic" => topic = Some(cell.to_string()),
                "task_given" => {
                    let task = cell
                        .parse::<TaskGiven>()
                        .map_err(|reason| anyhow!("row {line}: {reason}"))?;
                    task_given = Some(task);
                }
                field => ratings.push((field.to_string(), RatingValue::parse(cell))),
            }
        }

        let mut input = DailyReflectionInput::for_session(scope, session_date);
        input.task_given = task_given;
        input.note = note;
        input.topic = topic;
        input.ratings.extend(ratings);
        inputs.push(input);
    }

    Ok(inputs)
}

/// Submits every parsed row. Rows already recorded are skipped; the first
/// invalid row aborts the import with its line number.
pub async fn import_reflections<S: ReflectionStore + ?Sized, R: Read>(
    store: &S,
    config: &EngineConfig,
    reader: R,
    submitted_on: NaiveDate,
) -> anyhow::Result<ImportSummary> {
    let inputs = parse_reflections(reader)?;
    let mut summary = ImportSummary::default();

    for (index, input) in inputs.into_iter().enumerate() {
        let line = index + 2;
        match submit(store, config, input, submitted_on).await {
            Ok(_) => summary.inserted += 1,
            Err(CoreError::Conflict(conflict)) => {
                warn!(line, "skipping row: {conflict}");
                summary.skipped += 1;
            }
            Err(err) => return Err(err).with_context(|| format!("row {line} was rejected")),
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateRange;
    use crate::store::MemoryStore;

    const SAMPLE: &str = "\
teacher_id,class_id,subject_id,session_date,participation,attentiveness,energy,understanding,disruption,note
t-01,JSS2 Blue,maths,2026-03-02,4,4,3,4,2,fractions
t-01,JSS2 Blue,maths,2026-03-04,5,5,5,5,1,
t-01,JSS2 Blue,maths,2026-03-04,1,1,1,1,5,duplicate day
";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 6).unwrap()
    }

    #[test]
    fn parses_scope_ratings_and_notes() {
        let inputs = parse_reflections(SAMPLE.as_bytes()).unwrap();
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0].scope, Scope::new("t-01", "JSS2 Blue", "maths"));
        assert_eq!(inputs[0].ratings.get("energy"), Some(&RatingValue::Score(3)));
        assert_eq!(inputs[0].note.as_deref(), Some("fractions"));
        assert_eq!(inputs[1].note, None);
        assert_eq!(inputs[1].ratings.len(), 5);
        assert_ne!(inputs[0].id, inputs[1].id);
    }

    const FORM: &str = "\
teacher_id,class_id,subject_id,session_date,participation_level,attentiveness_level,number_present,task_given,topic
t-01,JSS2 Blue,maths,2026-03-02,High,medium,30,Classwork,fractions
t-01,JSS2 Blue,maths,2026-03-03,low,low,12,,
t-01,JSS2 Blue,maths,,high,high,28,test,
";

    #[test]
    fn keeps_task_and_topic_unscored() {
        let inputs = parse_reflections(FORM.as_bytes()).unwrap();
        assert_eq!(inputs[0].task_given, Some(TaskGiven::Classwork));
        assert_eq!(inputs[0].topic.as_deref(), Some("fractions"));
        assert_eq!(inputs[0].ratings.len(), 3);
        assert_eq!(
            inputs[0].ratings.get("participation_level"),
            Some(&RatingValue::Level("high".into()))
        );
        assert_eq!(inputs[1].task_given, None);
        assert_eq!(inputs[2].session_date, None);
    }

    #[test]
    fn unknown_task_names_the_row() {
        let csv = "teacher_id,class_id,subject_id,session_date,task_given
t-01,JSS2 Blue,maths,2026-03-02,homework
";
        let err = parse_reflections(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().starts_with("row 2: unknown task homework"));
    }

    #[tokio::test]
    async fn classroom_form_import_needs_a_roster() {
        let store = MemoryStore::new();
        let config = EngineConfig::classroom_form();
        let scope = Scope::new("t-01", "JSS2 Blue", "maths");
        store.set_class_size(&scope, 30).await.unwrap();

        let err = import_reflections(&store, &config, FORM.as_bytes(), today())
            .await
            .unwrap_err();
        // the undated third row is rejected after the first two are in
        assert!(err.to_string().contains("row 4"));

        let series = store.fetch_series(&scope, DateRange::all()).await.unwrap();
        assert_eq!(series.iter().map(|r| r.cei).collect::<Vec<_>>(), vec![100.0, 8.0]);
    }

    #[test]
    fn rejects_missing_scope_column() {
        let err = parse_reflections("teacher_id,session_date\nt-01,2026-03-02\n".as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("class_id"));
    }

    #[tokio::test]
    async fn imports_and_skips_duplicates() {
        let store = MemoryStore::new();
        let summary = import_reflections(&store, &EngineConfig::default(), SAMPLE.as_bytes(), today())
            .await
            .unwrap();
        assert_eq!(summary, ImportSummary { inserted: 2, skipped: 1 });

        let scope = Scope::new("t-01", "JSS2 Blue", "maths");
        let series = store.fetch_series(&scope, DateRange::all()).await.unwrap();
        assert_eq!(series[1].cei, 100.0);
    }

    #[tokio::test]
    async fn invalid_row_aborts_with_line_number() {
        let store = MemoryStore::new();
        let csv = "\
teacher_id,class_id,subject_id,session_date,participation,attentiveness,energy,understanding,disruption
t-01,JSS2 Blue,maths,2026-03-02,4,4,3,4,9
";
        let err = import_reflections(&store, &EngineConfig::default(), csv.as_bytes(), today())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }
}
