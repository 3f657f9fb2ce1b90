//! Account, credit balance and usage limits.

use crate::dispatch::Dispatch;
use crate::request::RequestSpec;
use reqwest::Method;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub id: Option<String>,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub plan: Plan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Credits {
    pub remaining: f64,
    pub total: f64,
    #[serde(default)]
    pub used: f64,
}

/// Per-feature limits. Features the plan does not include are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub chat: Option<Limit>,
    pub writer: Option<Limit>,
    pub image: Option<Limit>,
    pub trends: Option<Limit>,
    pub market: Option<Limit>,
    pub documents: Option<Limit>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limit {
    pub max_per_day: Option<u32>,
    pub max_per_minute: Option<u32>,
    pub used_today: u32,
}

/// The `account` namespace.
pub struct Account<'a, C> {
    client: &'a C,
}

impl<'a, C: Dispatch> Account<'a, C> {
    pub(crate) fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// The account owning the API key.
    pub fn me(&self) -> C::Call<AccountInfo> {
        self.get("/account/me")
    }

    pub fn credits(&self) -> C::Call<Credits> {
        self.get("/account/credits")
    }

    pub fn limits(&self) -> C::Call<Limits> {
        self.get("/account/limits")
    }

    fn get<T: serde::de::DeserializeOwned + Send + 'static>(&self, path: &str) -> C::Call<T> {
        self.client
            .call(self.client.prepare(RequestSpec::builder(Method::GET, path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::resources::testing;

    #[test]
    fn test_me_credits_limits() {
        let (client, recorder) = testing::client(&[
            (200, r#"{"email":"dev@example.com","plan":{"name":"Pro"}}"#),
            (200, r#"{"remaining":750,"total":1000}"#),
            (200, r#"{"chat":{"max_per_day":500,"used_today":12}}"#),
        ]);

        let account = client.account().me().unwrap();
        assert_eq!(account.plan.name, "Pro");

        let credits = client.account().credits().unwrap();
        assert!((credits.remaining - 750.0).abs() < f64::EPSILON);

        let limits = client.account().limits().unwrap();
        assert_eq!(limits.chat.unwrap().max_per_day, Some(500));
        assert!(limits.image.is_none());

        let paths: Vec<String> = recorder
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.path().to_string())
            .collect();
        assert_eq!(paths, ["/account/me", "/account/credits", "/account/limits"]);
    }

    #[test]
    fn test_unauthorized() {
        let (client, _) = testing::client(&[(401, r#"{"error":{"message":"invalid api key"}}"#)]);
        let err = client.account().me().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.status(), Some(401));
    }
}
