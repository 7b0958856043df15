use std::fmt::Write;

use chrono::NaiveDate;

use crate::dashboard::Dashboard;
use crate::models::WeeklyAggregate;

fn format_delta(week: &WeeklyAggregate) -> String {
    match week.trend_delta {
        Some(delta) => format!("{delta:+.2}"),
        None => "n/a".to_string(),
    }
}

pub fn build_report(dashboard: &Dashboard, window_weeks: usize, today: NaiveDate) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Class Engagement Report");
    let _ = writeln!(
        output,
        "Generated for {} / {} ({}), last {} weeks to {}",
        dashboard.scope.class_id,
        dashboard.scope.subject_id,
        dashboard.scope.teacher_id,
        window_weeks,
        today
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Trend");

    if dashboard.weeks.is_empty() {
        let _ = writeln!(output, "No sessions recorded in this window.");
    } else {
        let _ = writeln!(output, "| Week of | Sessions | Mean CEI | Std dev | Change | Trend |");
        let _ = writeln!(output, "|---|---|---|---|---|---|");
        for week in &dashboard.weeks {
            let _ = writeln!(
                output,
                "| {} | {} | {:.2} | {:.2} | {} | {} |",
                week.week_start,
                week.session_count,
                week.mean_cei,
                week.std_dev_cei,
                format_delta(week),
                week.trend_label
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Engagement");
    match &dashboard.engagement {
        Some(engagement) => {
            let _ = writeln!(
                output,
                "Average CEI {:.1} ({}): {}",
                engagement.mean_cei, engagement.status, engagement.message
            );
        }
        None => {
            let _ = writeln!(
                output,
                "Not enough entries yet to show a clear pattern. Keep reflecting over the next few days."
            );
        }
    }

    if !dashboard.reflections.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Weekly Reflections");
        for weekly in &dashboard.reflections {
            let _ = writeln!(output, "- Week of {}: {}", weekly.week_start, weekly.reflection);
        }
    }

    output
}
