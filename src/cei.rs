use crate::config::{EngineConfig, FieldRange, FieldSpec};
use crate::models::{RatingValue, ValidatedInput};

pub const CEI_MIN: f64 = 0.0;
pub const CEI_MAX: f64 = 100.0;

/// Class Engagement Index for one validated session, in `[0, 100]`, one decimal.
///
/// Every configured field is normalized to `[0, 1]` over its declared range,
/// inverted where configured, and combined with the configured weights.
/// The input must have been validated against the same `config`.
pub fn compute_cei(input: &ValidatedInput, config: &EngineConfig) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for spec in &config.fields {
        let normalized = input
            .rating(&spec.name)
            .and_then(|value| normalize(spec, value, input.class_size()))
            .unwrap_or(0.0);
        let oriented = if spec.invert { 1.0 - normalized } else { normalized };
        weighted += spec.weight * oriented;
        total_weight += spec.weight;
    }

    if total_weight <= 0.0 {
        return CEI_MIN;
    }

    round_to_tenth((weighted / total_weight * CEI_MAX).clamp(CEI_MIN, CEI_MAX))
}

/// Linear position of `value` within the field's range, `None` if it is not in it.
///
/// Attendance is the share of the roster present, so it needs `class_size`.
pub fn normalize(spec: &FieldSpec, value: &RatingValue, class_size: Option<u32>) -> Option<f64> {
    match (&spec.range, value) {
        (FieldRange::Attendance, RatingValue::Score(present)) => {
            let size = i64::from(class_size.filter(|size| *size > 0)?);
            if *present < 0 || *present > size {
                return None;
            }
            Some(*present as f64 / size as f64)
        }
        (FieldRange::Scale { min, max }, RatingValue::Score(score)) => {
            if score < min || score > max || min >= max {
                return None;
            }
            Some((score - min) as f64 / (max - min) as f64)
        }
        (FieldRange::Levels { levels }, RatingValue::Level(level)) => {
            if levels.len() < 2 {
                return None;
            }
            let position = levels
                .iter()
                .position(|allowed| allowed.eq_ignore_ascii_case(level))?;
            Some(position as f64 / (levels.len() - 1) as f64)
        }
        _ => None,
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{DailyReflectionInput, Scope};
    use crate::validate::{validate, validate_for_class};

    const FIELDS: [&str; 5] = [
        "participation",
        "attentiveness",
        "energy",
        "understanding",
        "disruption",
    ];

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 5).unwrap()
    }

    fn scored(values: [i64; 5], config: &EngineConfig) -> f64 {
        let mut input = DailyReflectionInput::new(Scope::new("t-01", "JSS1 Gold", "science"), day());
        for (field, value) in FIELDS.iter().zip(values) {
            input = input.with_score(*field, value);
        }
        let validated = validate(input, config, day()).unwrap();
        compute_cei(&validated, config)
    }

    #[test]
    fn maximal_engagement_scores_one_hundred() {
        assert_eq!(scored([5, 5, 5, 5, 1], &EngineConfig::default()), 100.0);
    }

    #[test]
    fn minimal_engagement_scores_zero() {
        assert_eq!(scored([1, 1, 1, 1, 5], &EngineConfig::default()), 0.0);
    }

    #[test]
    fn both_ends_reachable_without_inversion() {
        let mut config = EngineConfig::default();
        for field in &mut config.fields {
            field.invert = false;
        }
        assert_eq!(scored([1, 1, 1, 1, 1], &config), 0.0);
        assert_eq!(scored([5, 5, 5, 5, 5], &config), 100.0);
    }

    #[test]
    fn weighted_average_rounds_to_one_decimal() {
        // 0.3*0.75 + 0.2*0.5 + 0.2*0.5 + 0.2*0.25 + 0.1*(1 - 0.25) = 0.55
        assert_eq!(scored([4, 3, 3, 2, 2], &EngineConfig::default()), 55.0);
        // 0.3*0.5 + 0.2*0.75 + 0.2*0.25 + 0.2*0.5 + 0.1*0.5 = 0.5
        assert_eq!(scored([3, 4, 2, 3, 3], &EngineConfig::default()), 50.0);
    }

    #[test]
    fn is_deterministic_and_bounded() {
        let config = EngineConfig::default();
        for a in 1..=5 {
            for b in 1..=5 {
                let values = [a, b, 6 - a, b, a];
                let first = scored(values, &config);
                assert_eq!(first, scored(values, &config));
                assert!((CEI_MIN..=CEI_MAX).contains(&first));
            }
        }
    }

    fn form_score(participation: &str, attentiveness: &str, present: i64, class_size: u32) -> f64 {
        let config = EngineConfig::classroom_form();
        let input = DailyReflectionInput::new(Scope::new("t-01", "JSS2 Blue", "maths"), day())
            .with_rating("participation_level", RatingValue::Level(participation.into()))
            .with_rating("attentiveness_level", RatingValue::Level(attentiveness.into()))
            .with_score("number_present", present);
        let validated = validate_for_class(input, &config, day(), Some(class_size)).unwrap();
        compute_cei(&validated, &config)
    }

    #[test]
    fn classroom_form_scores_attendance_against_roster() {
        // 0.4 * 1.0 + 0.4 * 0.5 + 0.2 * 28/30
        assert_eq!(form_score("high", "medium", 28, 30), 78.7);
        assert_eq!(form_score("high", "high", 30, 30), 100.0);
        assert_eq!(form_score("low", "low", 0, 30), 0.0);
    }

    #[test]
    fn attendance_needs_a_positive_class_size() {
        let spec = FieldSpec {
            name: "number_present".into(),
            weight: 1.0,
            invert: false,
            range: FieldRange::Attendance,
        };
        assert_eq!(normalize(&spec, &RatingValue::Score(15), Some(30)), Some(0.5));
        assert_eq!(normalize(&spec, &RatingValue::Score(15), Some(0)), None);
        assert_eq!(normalize(&spec, &RatingValue::Score(15), None), None);
        assert_eq!(normalize(&spec, &RatingValue::Score(31), Some(30)), None);
    }

    #[test]
    fn levels_normalize_by_position() {
        let spec = FieldSpec {
            name: "participation".into(),
            weight: 1.0,
            invert: false,
            range: FieldRange::Levels {
                levels: vec!["low".into(), "medium".into(), "high".into()],
            },
        };
        assert_eq!(normalize(&spec, &RatingValue::Level("low".into()), None), Some(0.0));
        assert_eq!(normalize(&spec, &RatingValue::Level("Medium".into()), None), Some(0.5));
        assert_eq!(normalize(&spec, &RatingValue::Level("high".into()), None), Some(1.0));
        assert_eq!(normalize(&spec, &RatingValue::Score(2), None), None);
    }
}
