use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::core::feed::types::TrendItem;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn toggle(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortOrder::Asc => "oldest first",
            SortOrder::Desc => "newest first",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("asc"),
            SortOrder::Desc => f.write_str("desc"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown sort order {0:?} (expected asc or desc)")]
pub struct ParseSortOrderError(String);

impl FromStr for SortOrder {
    type Err = ParseSortOrderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(ParseSortOrderError(other.to_string())),
        }
    }
}

/// Unix seconds for a feed `pubDate` (RFC 2822, or RFC 3339 as a fallback).
/// Anything unparseable counts as the epoch.
pub fn pub_date_timestamp(raw: &str) -> i64 {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|timestamp| timestamp.timestamp())
        .unwrap_or(0)
}

/// Returns a date-ordered copy of `items`. The sort is stable, so entries with
/// equal timestamps keep their feed order.
pub fn sort_trends(items: &[TrendItem], order: SortOrder) -> Vec<TrendItem> {
    let mut sorted = items.to_vec();
    match order {
        SortOrder::Asc => sorted.sort_by_key(|item| pub_date_timestamp(&item.pub_date)),
        SortOrder::Desc => sorted.sort_by_key(|item| Reverse(pub_date_timestamp(&item.pub_date))),
    }
    sorted
}
