use chrono::NaiveDate;

use crate::config::{EngineConfig, FieldRange, FieldSpec};
use crate::error::ValidationError;
use crate::models::{DailyReflectionInput, RatingValue, ValidatedInput};

/// Checks a raw reflection against the configured field ranges.
///
/// `submitted_on` is the submission date; a session dated after it is rejected.
pub fn validate(
    input: DailyReflectionInput,
    config: &EngineConfig,
    submitted_on: NaiveDate,
) -> Result<ValidatedInput, ValidationError> {
    validate_for_class(input, config, submitted_on, None)
}

/// Like [`validate`], with the class size attendance fields are checked against.
pub fn validate_for_class(
    input: DailyReflectionInput,
    config: &EngineConfig,
    submitted_on: NaiveDate,
    class_size: Option<u32>,
) -> Result<ValidatedInput, ValidationError> {
    for (field, value) in [
        ("teacher_id", &input.scope.teacher_id),
        ("class_id", &input.scope.class_id),
        ("subject_id", &input.scope.subject_id),
    ] {
        if value.trim().is_empty() {
            return Err(missing(field));
        }
    }

    let session_date = input.session_date.ok_or_else(|| missing("date"))?;
    if session_date > submitted_on {
        return Err(ValidationError::FutureDate {
            date: session_date,
            submitted_on,
        });
    }

    for spec in &config.fields {
        let value = input
            .ratings
            .get(&spec.name)
            .ok_or_else(|| missing(&spec.name))?;
        check_rating(spec, value, class_size)?;
    }

    if let Some(field) = input
        .ratings
        .keys()
        .find(|name| config.field(name).is_none())
    {
        return Err(ValidationError::UnknownField {
            field: field.clone(),
        });
    }

    Ok(ValidatedInput::new(input, session_date, class_size))
}

fn missing(field: &str) -> ValidationError {
    ValidationError::Missing {
        field: field.to_string(),
    }
}

fn check_rating(
    spec: &FieldSpec,
    value: &RatingValue,
    class_size: Option<u32>,
) -> Result<(), ValidationError> {
    let in_range = match (&spec.range, value) {
        (FieldRange::Attendance, RatingValue::Score(present)) => {
            let size = class_size.ok_or_else(|| missing("class_size"))?;
            if !(0..=i64::from(size)).contains(present) {
                return Err(ValidationError::OutOfRange {
                    field: spec.name.clone(),
                    value: present.to_string(),
                    allowed_range: format!("0..={size}"),
                });
            }
            true
        }
        (FieldRange::Scale { min, max }, RatingValue::Score(score)) => (*min..=*max).contains(score),
        (FieldRange::Levels { levels }, RatingValue::Level(level)) => {
            levels.iter().any(|allowed| allowed.eq_ignore_ascii_case(level))
        }
        _ => {
            return Err(ValidationError::WrongKind {
                field: spec.name.clone(),
                value: value.to_string(),
                allowed_range: spec.range.to_string(),
            })
        }
    };

    if in_range {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field: spec.name.clone(),
            value: value.to_string(),
            allowed_range: spec.range.to_string(),
        })
    }
}
