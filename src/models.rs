use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One teacher's data stream for one class and subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub teacher_id: String,
    pub class_id: String,
    pub subject_id: String,
}

impl Scope {
    pub fn new(
        teacher_id: impl Into<String>,
        class_id: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            teacher_id: teacher_id.into(),
            class_id: class_id.into(),
            subject_id: subject_id.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.teacher_id, self.class_id, self.subject_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RatingValue {
    Score(i64),
    Level(String),
}

impl RatingValue {
    /// Integers become scores, anything else is taken as a categorical level.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(score) => RatingValue::Score(score),
            Err(_) => RatingValue::Level(trimmed.to_lowercase()),
        }
    }
}

impl fmt::Display for RatingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatingValue::Score(score) => write!(f, "{score}"),
            RatingValue::Level(level) => write!(f, "{level}"),
        }
    }
}

/// Kind of work set during the session. Recorded for context, never scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskGiven {
    #[serde(rename = "none")]
    NoTask,
    Classwork,
    Assignment,
    Test,
}

impl TaskGiven {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskGiven::NoTask => "none",
            TaskGiven::Classwork => "classwork",
            TaskGiven::Assignment => "assignment",
            TaskGiven::Test => "test",
        }
    }
}

impl fmt::Display for TaskGiven {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskGiven {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "none" | "" => Ok(TaskGiven::NoTask),
            "classwork" => Ok(TaskGiven::Classwork),
            "assignment" => Ok(TaskGiven::Assignment),
            "test" => Ok(TaskGiven::Test),
            other => Err(format!(
                "unknown task {other}, expected none, classwork, assignment or test"
            )),
        }
    }
}

/// Raw teacher entry for one class session. Never mutated once scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReflectionInput {
    pub id: Uuid,
    pub scope: Scope,
    pub session_date: Option<NaiveDate>,
    pub ratings: BTreeMap<String, RatingValue>,
    #[serde(default)]
    pub task_given: Option<TaskGiven>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl DailyReflectionInput {
    pub fn new(scope: Scope, session_date: NaiveDate) -> Self {
        Self::for_session(scope, Some(session_date))
    }

    /// Entry whose date may still be missing; validation reports it.
    pub fn for_session(scope: Scope, session_date: Option<NaiveDate>) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            session_date,
            ratings: BTreeMap::new(),
            task_given: None,
            topic: None,
            note: None,
        }
    }

    pub fn with_rating(mut self, field: impl Into<String>, value: RatingValue) -> Self {
        self.ratings.insert(field.into(), value);
        self
    }

    pub fn with_score(self, field: impl Into<String>, score: i64) -> Self {
        self.with_rating(field, RatingValue::Score(score))
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// An input that passed validation. Only `validate` builds one.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    input: DailyReflectionInput,
    session_date: NaiveDate,
    class_size: Option<u32>,
}

impl ValidatedInput {
    pub(crate) fn new(
        input: DailyReflectionInput,
        session_date: NaiveDate,
        class_size: Option<u32>,
    ) -> Self {
        Self {
            input,
            session_date,
            class_size,
        }
    }

    /// Roster size the attendance fields were checked against.
    pub fn class_size(&self) -> Option<u32> {
        self.class_size
    }

    pub fn input(&self) -> &DailyReflectionInput {
        &self.input
    }

    pub fn scope(&self) -> &Scope {
        &self.input.scope
    }

    pub fn session_date(&self) -> NaiveDate {
        self.session_date
    }

    pub fn rating(&self, field: &str) -> Option<&RatingValue> {
        self.input.ratings.get(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CeiRecord {
    pub scope: Scope,
    pub date: NaiveDate,
    pub cei: f64,
    pub raw_input_id: Uuid,
}

/// Inclusive date bounds; `None` leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrendLabel {
    Rising,
    Falling,
    Stable,
    InsufficientData,
}

impl TrendLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendLabel::Rising => "rising",
            TrendLabel::Falling => "falling",
            TrendLabel::Stable => "stable",
            TrendLabel::InsufficientData => "insufficient-data",
        }
    }
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-text reflection on one week of a class, keyed by scope and week start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyReflection {
    pub scope: Scope,
    pub week_start: NaiveDate,
    pub reflection: String,
}

/// Computed on demand from the record series, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyAggregate {
    pub scope: Scope,
    pub week_start: NaiveDate,
    pub session_count: usize,
    pub mean_cei: f64,
    pub std_dev_cei: f64,
    pub trend_delta: Option<f64>,
    pub trend_label: TrendLabel,
}
