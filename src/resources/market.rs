//! Market quotes.

use super::require;
use crate::dispatch::Dispatch;
use crate::error::Error;
use crate::request::RequestSpec;
use reqwest::Method;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub change: f64,
    #[serde(default)]
    pub change_percent: f64,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub volume: Option<u64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoQuote {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub change_percent_24h: f64,
    #[serde(default)]
    pub volume_24h: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

/// The `market` namespace.
pub struct Market<'a, C> {
    client: &'a C,
}

impl<'a, C: Dispatch> Market<'a, C> {
    pub(crate) fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub fn stocks(&self) -> Stocks<'a, C> {
        Stocks {
            client: self.client,
        }
    }

    pub fn crypto(&self) -> Crypto<'a, C> {
        Crypto {
            client: self.client,
        }
    }
}

/// The `market.stocks` namespace.
pub struct Stocks<'a, C> {
    client: &'a C,
}

impl<C: Dispatch> Stocks<'_, C> {
    /// Latest quote for a ticker such as `AAPL`.
    pub fn get(&self, symbol: &str) -> C::Call<StockQuote> {
        self.client.call(quote(self.client, "/market/stocks/{symbol}", symbol))
    }
}

/// The `market.crypto` namespace.
pub struct Crypto<'a, C> {
    client: &'a C,
}

impl<C: Dispatch> Crypto<'_, C> {
    /// Latest quote for a coin such as `BTC`.
    pub fn get(&self, symbol: &str) -> C::Call<CryptoQuote> {
        self.client.call(quote(self.client, "/market/crypto/{symbol}", symbol))
    }
}

fn quote<C: Dispatch>(
    client: &C,
    template: &str,
    symbol: &str,
) -> Result<RequestSpec, Error> {
    require("symbol", symbol)?;
    client.prepare(RequestSpec::builder(Method::GET, template).path_param("symbol", symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::resources::testing;

    #[test]
    fn test_stock_quote() {
        let (client, recorder) = testing::client(&[(
            200,
            r#"{"symbol":"AAPL","price":189.5,"change_percent":1.2,"market_cap":2.9e12}"#,
        )]);

        let stock = client.market().stocks().get("AAPL").unwrap();
        assert_eq!(stock.market_cap, Some(2.9e12));
        assert_eq!(recorder.last().path(), "/market/stocks/AAPL");
    }

    #[test]
    fn test_crypto_quote() {
        let (client, recorder) = testing::client(&[(
            200,
            r#"{"symbol":"BTC","price":67000.25,"change_percent_24h":-2.5,"volume_24h":3.1e10}"#,
        )]);

        let btc = client.market().crypto().get("BTC").unwrap();
        assert!((btc.change_percent_24h + 2.5).abs() < f64::EPSILON);
        assert_eq!(recorder.last().path(), "/market/crypto/BTC");
    }

    #[test]
    fn test_bad_symbols_rejected() {
        let (client, recorder) = testing::client(&[]);
        for symbol in ["", "  ", "BRK/B", "a b"] {
            let err = client.market().stocks().get(symbol).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{symbol:?}");
        }
        assert_eq!(recorder.calls(), 0);
    }

    #[test]
    fn test_missing_price_is_decode_error() {
        let (client, _) = testing::client(&[(200, r#"{"symbol":"AAPL"}"#)]);
        let err = client.market().stocks().get("AAPL").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}
