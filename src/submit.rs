use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::cei::compute_cei;
use crate::config::{EngineConfig, TrendConfig};
use crate::error::{CoreError, StoreError, ValidationError};
use crate::models::{CeiRecord, DailyReflectionInput, RecordId, Scope, WeeklyReflection};
use crate::store::ReflectionStore;
use crate::trend::week_start;
use crate::validate::validate_for_class;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmittedReflection {
    pub id: RecordId,
    pub record: CeiRecord,
}

/// Validates, scores and persists one reflection.
///
/// The raw input is archived before the record is saved, so every stored
/// record can be traced back to what was entered. A second submission for the
/// same scope and date fails with [`CoreError::Conflict`]; the earlier record
/// has to be retracted first.
pub async fn submit<S: ReflectionStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    input: DailyReflectionInput,
    submitted_on: NaiveDate,
) -> Result<SubmittedReflection, CoreError> {
    let class_size = if config.needs_roster() {
        store.class_size(&input.scope).await?
    } else {
        None
    };

    let validated = validate_for_class(input, config, submitted_on, class_size).map_err(|err| {
        warn!(field = err.field(), reason = err.reason(), "rejected reflection: {err}");
        err
    })?;

    let record = CeiRecord {
        scope: validated.scope().clone(),
        date: validated.session_date(),
        cei: compute_cei(&validated, config),
        raw_input_id: validated.input().id,
    };

    store.archive_input(validated.input()).await?;
    let id = match store.save(&record).await {
        Ok(id) => id,
        Err(StoreError::Conflict(conflict)) => {
            warn!(scope = %conflict.scope, date = %conflict.date, existing = %conflict.existing, "duplicate reflection");
            return Err(CoreError::Conflict(conflict));
        }
        Err(err) => return Err(err.into()),
    };

    info!(id = %id, scope = %record.scope, date = %record.date, cei = record.cei, "reflection scored");
    Ok(SubmittedReflection { id, record })
}

/// Removes a scored record so its scope and date can be submitted again.
pub async fn retract<S: ReflectionStore + ?Sized>(store: &S, id: RecordId) -> Result<(), CoreError> {
    store.retract(id).await?;
    info!(id = %id, "reflection retracted");
    Ok(())
}

/// Records how many students are on the roster of the scope's class.
pub async fn setup_class<S: ReflectionStore + ?Sized>(
    store: &S,
    scope: &Scope,
    class_size: u32,
) -> Result<(), CoreError> {
    for (field, value) in [("teacher_id", &scope.teacher_id), ("class_id", &scope.class_id)] {
        if value.trim().is_empty() {
            return Err(ValidationError::Missing {
                field: field.to_string(),
            }
            .into());
        }
    }
    if class_size == 0 {
        return Err(ValidationError::OutOfRange {
            field: "class_size".into(),
            value: class_size.to_string(),
            allowed_range: "1..".into(),
        }
        .into());
    }

    store.set_class_size(scope, class_size).await?;
    info!(teacher = %scope.teacher_id, class = %scope.class_id, class_size, "class roster set");
    Ok(())
}

/// Saves the free-text reflection for the week containing `date`,
/// replacing whatever was written for that week before.
pub async fn reflect_on_week<S: ReflectionStore + ?Sized>(
    store: &S,
    trend: &TrendConfig,
    scope: Scope,
    date: NaiveDate,
    text: &str,
    submitted_on: NaiveDate,
) -> Result<WeeklyReflection, CoreError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::Missing {
            field: "reflection".into(),
        }
        .into());
    }
    if date > submitted_on {
        return Err(ValidationError::FutureDate { date, submitted_on }.into());
    }

    let reflection = WeeklyReflection {
        scope,
        week_start: week_start(date, trend.week_start),
        reflection: text.to_string(),
    };
    store.save_weekly_reflection(&reflection).await?;
    info!(scope = %reflection.scope, week_start = %reflection.week_start, "weekly reflection saved");
    Ok(reflection)
}
