//! Conversion of persisted issue records into historical tasks

use super::models::{FieldMap, HistoricalTask, IssueRecord, Size};
use tracing::debug;

/// Custom field names recognized as actual effort hours
pub const HOURS_FIELDS: &[&str] = &["Worker Hours", "Hours", "Actual Hours"];
/// Custom field names recognized as story points
pub const POINTS_FIELDS: &[&str] = &["Story Points", "Points"];
/// Custom field names recognized as size category
pub const SIZE_FIELDS: &[&str] = &["Size", "Complexity"];

/// Build the eligible historical corpus from raw issue records
///
/// Only closed records carrying at least one of hours, story points or a
/// recognized size are kept; corpus order follows input order.
pub fn historical_from_issues(issues: Vec<IssueRecord>) -> Vec<HistoricalTask> {
    let total = issues.len();
    let historical: Vec<HistoricalTask> = issues
        .into_iter()
        .filter(IssueRecord::is_closed)
        .filter_map(historical_from_issue)
        .collect();

    debug!(
        "Kept {} of {} issue records as historical tasks",
        historical.len(),
        total
    );

    historical
}

/// Derive a historical task from a single closed record, if it is eligible
pub fn historical_from_issue(issue: IssueRecord) -> Option<HistoricalTask> {
    let actual_hours = extract_number(&issue.custom_fields, HOURS_FIELDS).unwrap_or(0.0);
    let story_points = extract_number(&issue.custom_fields, POINTS_FIELDS).unwrap_or(0.0);
    let size = extract_size(&issue.custom_fields, SIZE_FIELDS);

    if actual_hours <= 0.0 && story_points <= 0.0 && size.is_none() {
        return None;
    }

    Some(HistoricalTask {
        issue: Some(issue),
        actual_hours: actual_hours.max(0.0),
        size,
        story_points: story_points.max(0.0),
    })
}

/// First alias present with a numeric value
fn extract_number(fields: &FieldMap, aliases: &[&str]) -> Option<f64> {
    aliases
        .iter()
        .filter_map(|key| fields.get(*key))
        .find_map(|value| value.as_f64())
        .filter(|n| n.is_finite())
}

/// First alias present with a recognized size code
fn extract_size(fields: &FieldMap, aliases: &[&str]) -> Option<Size> {
    aliases
        .iter()
        .filter_map(|key| fields.get(*key))
        .filter_map(|value| value.as_text())
        .find_map(|text| text.parse::<Size>().ok())
}
