//! Trend discovery across platforms.

use super::require;
use crate::dispatch::Dispatch;
use crate::request::RequestSpec;
use reqwest::Method;
use serde::{Deserialize, Serialize};

/// Cross-platform trend query.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSearch {
    pub query: String,
    /// Restrict to these platforms; all platforms when empty.
    pub platforms: Vec<String>,
    /// Lookback window, e.g. `7d`.
    pub timeframe: Option<String>,
    pub limit: Option<u32>,
}

impl TrendSearch {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            platforms: Vec::new(),
            timeframe: None,
            limit: None,
        }
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platforms.push(platform.into());
        self
    }

    pub fn timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = Some(timeframe.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A trending item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub platform: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub engagement: Option<f64>,
    /// Percent growth over the timeframe.
    #[serde(default)]
    pub growth_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendList {
    #[serde(alias = "data")]
    pub items: Vec<Trend>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// YouTube video query.
#[derive(Debug, Clone, PartialEq)]
pub struct YoutubeSearch {
    pub query: String,
    pub timeframe: Option<String>,
    /// e.g. `views`.
    pub sort_by: Option<String>,
    pub limit: Option<u32>,
}

impl YoutubeSearch {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            timeframe: None,
            sort_by: None,
            limit: None,
        }
    }

    pub fn timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = Some(timeframe.into());
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort_by = Some(field.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoutubeTrend {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub url: Option<String>,
}

/// The `trends` namespace.
pub struct Trends<'a, C> {
    client: &'a C,
}

impl<'a, C: Dispatch> Trends<'a, C> {
    pub(crate) fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub fn search(&self, search: &TrendSearch) -> C::Call<TrendList> {
        let spec = require("query", &search.query).and_then(|()| {
            let builder = search.platforms.iter().fold(
                RequestSpec::builder(Method::GET, "/trends/search").query("query", &search.query),
                |b, platform| b.query("platforms", platform),
            );
            self.client.prepare(
                builder
                    .query_opt("timeframe", search.timeframe.as_ref())
                    .query_opt("limit", search.limit),
            )
        });
        self.client.call(spec)
    }

    pub fn youtube(&self) -> Youtube<'a, C> {
        Youtube {
            client: self.client,
        }
    }
}

/// The `trends.youtube` namespace.
pub struct Youtube<'a, C> {
    client: &'a C,
}

impl<C: Dispatch> Youtube<'_, C> {
    pub fn search(&self, search: &YoutubeSearch) -> C::Call<Vec<YoutubeTrend>> {
        let spec = require("query", &search.query).and_then(|()| {
            self.client.prepare(
                RequestSpec::builder(Method::GET, "/trends/youtube/search")
                    .query("query", &search.query)
                    .query_opt("timeframe", search.timeframe.as_ref())
                    .query_opt("sort_by", search.sort_by.as_ref())
                    .query_opt("limit", search.limit),
            )
        });
        self.client.call(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing;

    fn query(spec: &RequestSpec) -> Vec<(&str, &str)> {
        spec.query()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    #[test]
    fn test_search_repeats_platforms() {
        let (client, recorder) = testing::client(&[(
            200,
            r#"{"items":[{"platform":"reddit","title":"LLM agents","engagement":1200,"growth_rate":35.5}]}"#,
        )]);

        let trends = client
            .trends()
            .search(
                &TrendSearch::new("artificial intelligence")
                    .platform("youtube")
                    .platform("reddit")
                    .timeframe("7d")
                    .limit(10),
            )
            .unwrap();
        assert_eq!(trends.items[0].growth_rate, Some(35.5));

        let spec = recorder.last();
        assert_eq!(spec.path(), "/trends/search");
        assert_eq!(
            query(&spec),
            [
                ("query", "artificial intelligence"),
                ("platforms", "youtube"),
                ("platforms", "reddit"),
                ("timeframe", "7d"),
                ("limit", "10"),
            ]
        );
    }

    #[test]
    fn test_youtube_search() {
        let (client, recorder) = testing::client(&[(
            200,
            r#"[{"title":"Rust in 100 seconds","views":5000000},{"title":"Async Rust","views":120000}]"#,
        )]);

        let videos = client
            .trends()
            .youtube()
            .search(&YoutubeSearch::new("programming tutorials").sort_by("views"))
            .unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].views, 5_000_000);
        assert_eq!(
            query(&recorder.last()),
            [("query", "programming tutorials"), ("sort_by", "views")]
        );
    }
}
