//! Daily digest queries over stored insights.

use aidigest_shared::{AiDigestError, InsightWithSource, Result};
use aidigest_storage::Storage;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;

/// Insights of one category, most important first.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryGroup {
    pub category: String,
    pub insights: Vec<InsightWithSource>,
}

/// `[start, end)` bounds of a UTC calendar day.
pub fn day_bounds(date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AiDigestError::validation(format!("invalid date {date}")))?
        .and_utc();
    let end = start
        .checked_add_days(Days::new(1))
        .ok_or_else(|| AiDigestError::validation(format!("date {date} out of range")))?;
    Ok((start, end))
}

/// Insights created on `date` (UTC), ordered by importance.
pub async fn insights_for_date(storage: &Storage, date: NaiveDate) -> Result<Vec<InsightWithSource>> {
    let (start, end) = day_bounds(date)?;
    storage.insights_between(start, end).await
}

/// Group importance-ordered insights by category.
///
/// Groups appear in the order of their first (most important) insight.
pub fn group_by_category(insights: Vec<InsightWithSource>) -> Vec<CategoryGroup> {
    let mut groups: Vec<CategoryGroup> = Vec::new();
    for insight in insights {
        match groups
            .iter_mut()
            .find(|g| g.category == insight.insight.category)
        {
            Some(group) => group.insights.push(insight),
            None => groups.push(CategoryGroup {
                category: insight.insight.category.clone(),
                insights: vec![insight],
            }),
        }
    }
    groups
}
