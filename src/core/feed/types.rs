use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Geo {
    #[serde(rename = "BD")]
    Bangladesh,
    #[serde(rename = "GB")]
    UnitedKingdom,
}

impl Geo {
    pub const ALL: [Geo; 2] = [Geo::Bangladesh, Geo::UnitedKingdom];

    pub fn code(self) -> &'static str {
        match self {
            Geo::Bangladesh => "BD",
            Geo::UnitedKingdom => "GB",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Geo::Bangladesh => "Bangladesh",
            Geo::UnitedKingdom => "United Kingdom",
        }
    }
}

impl fmt::Display for Geo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub source: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrendItem {
    pub id: String,
    pub title: String,
    pub traffic: String,
    /// Raw value of `<pubDate>`; ordering falls back to the epoch when it does not parse.
    pub pub_date: String,
    pub main_picture: Option<String>,
    pub picture_source: Option<String>,
    pub news_items: Vec<NewsItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedData {
    pub country: String,
    pub items: Vec<TrendItem>,
    pub last_updated: String,
}
