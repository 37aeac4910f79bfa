//! 1inch v3 aggregator client.

use super::{Quote, QuoteRequest, SwapAggregator, SwapRequest, SwapResponse, SwapTransaction, TokenInfo};
use crate::error::AggregatorError;
use alloy::primitives::{Address, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

/// Public 1inch v3 endpoint.
pub const DEFAULT_ONEINCH_URL: &str = "https://api.1inch.exchange/v3.0";

/// 1inch client for one chain.
///
/// The spender address is fetched once and cached for the lifetime of the
/// client.
pub struct OneInchClient {
    client: reqwest::Client,
    base_url: String,
    chain_id: u64,
    api_key: Option<String>,
    spender: OnceCell<Address>,
}

impl std::fmt::Debug for OneInchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneInchClient")
            .field("base_url", &self.base_url)
            .field("chain_id", &self.chain_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("spender", &self.spender.get())
            .finish()
    }
}

impl OneInchClient {
    pub fn new(chain_id: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: DEFAULT_ONEINCH_URL.to_string(),
            chain_id,
            api_key: None,
            spender: OnceCell::new(),
        }
    }

    /// Create with custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send `key` as a bearer token on every request.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), self.chain_id, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AggregatorError> {
        let mut request = self.client.get(self.endpoint(path)).query(query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AggregatorError::from_response(status, body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_spender(&self) -> Result<Address, AggregatorError> {
        let response: SpenderResponse = self.get("approve/spender", &[]).await?;
        debug!(spender = %response.address, "1inch spender fetched");
        Ok(response.address)
    }

    #[instrument(skip(self), fields(from = %request.from_token, to = %request.to_token))]
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<Quote, AggregatorError> {
        let raw: RawQuote = self
            .get(
                "quote",
                &[
                    ("fromTokenAddress", request.from_token.to_string()),
                    ("toTokenAddress", request.to_token.to_string()),
                    ("amount", request.amount.to_string()),
                ],
            )
            .await?;
        raw.try_into()
    }

    #[instrument(skip(self), fields(from = %request.from_token, to = %request.to_token))]
    async fn fetch_swap(&self, request: &SwapRequest) -> Result<SwapResponse, AggregatorError> {
        let raw: RawSwap = self
            .get(
                "swap",
                &[
                    ("fromTokenAddress", request.from_token.to_string()),
                    ("toTokenAddress", request.to_token.to_string()),
                    ("amount", request.amount.to_string()),
                    ("fromAddress", request.from_address.to_string()),
                    ("slippage", request.slippage_percent.to_string()),
                    ("disableEstimate", request.disable_estimate.to_string()),
                ],
            )
            .await?;
        raw.try_into()
    }
}

#[async_trait]
impl SwapAggregator for OneInchClient {
    fn aggregator_id(&self) -> &str {
        "1inch"
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn spender(&self) -> Result<Address> {
        let spender = self.spender.get_or_try_init(|| self.fetch_spender()).await?;
        Ok(*spender)
    }

    async fn quote(&self, request: QuoteRequest) -> Result<Quote> {
        Ok(self.fetch_quote(&request).await?)
    }

    async fn swap(&self, request: SwapRequest) -> Result<SwapResponse> {
        Ok(self.fetch_swap(&request).await?)
    }
}

fn parse_amount(field: &'static str, value: &str) -> Result<U256, AggregatorError> {
    value
        .parse::<U256>()
        .map_err(|_| AggregatorError::InvalidField {
            field,
            value: value.to_string(),
        })
}

// API response types

#[derive(Debug, Deserialize)]
struct SpenderResponse {
    address: Address,
}

#[derive(Debug, Deserialize)]
struct RawToken {
    symbol: String,
    address: Address,
    decimals: u8,
}

impl From<RawToken> for TokenInfo {
    fn from(raw: RawToken) -> Self {
        Self {
            address: raw.address,
            symbol: raw.symbol,
            decimals: raw.decimals,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(rename = "fromToken")]
    from_token: RawToken,
    #[serde(rename = "toToken")]
    to_token: RawToken,
    #[serde(rename = "fromTokenAmount")]
    from_token_amount: String,
    #[serde(rename = "toTokenAmount")]
    to_token_amount: String,
    #[serde(rename = "estimatedGas", default)]
    estimated_gas: u64,
}

impl TryFrom<RawQuote> for Quote {
    type Error = AggregatorError;

    fn try_from(raw: RawQuote) -> Result<Self, Self::Error> {
        Ok(Quote {
            from_token_amount: parse_amount("fromTokenAmount", &raw.from_token_amount)?,
            to_token_amount: parse_amount("toTokenAmount", &raw.to_token_amount)?,
            from_token: raw.from_token.into(),
            to_token: raw.to_token.into(),
            estimated_gas: raw.estimated_gas,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawSwapTx {
    from: Address,
    to: Address,
    data: Bytes,
    value: String,
    gas: u64,
    #[serde(rename = "gasPrice")]
    gas_price: String,
}

#[derive(Debug, Deserialize)]
struct RawSwap {
    #[serde(rename = "fromToken")]
    from_token: RawToken,
    #[serde(rename = "toToken")]
    to_token: RawToken,
    #[serde(rename = "fromTokenAmount")]
    from_token_amount: String,
    #[serde(rename = "toTokenAmount")]
    to_token_amount: String,
    tx: RawSwapTx,
}

impl TryFrom<RawSwap> for SwapResponse {
    type Error = AggregatorError;

    fn try_from(raw: RawSwap) -> Result<Self, Self::Error> {
        Ok(SwapResponse {
            from_token_amount: parse_amount("fromTokenAmount", &raw.from_token_amount)?,
            to_token_amount: parse_amount("toTokenAmount", &raw.to_token_amount)?,
            from_token: raw.from_token.into(),
            to_token: raw.to_token.into(),
            tx: SwapTransaction {
                from: raw.tx.from,
                to: raw.tx.to,
                data: raw.tx.data,
                value: parse_amount("tx.value", &raw.tx.value)?,
                gas: raw.tx.gas,
                gas_price: parse_amount("tx.gasPrice", &raw.tx.gas_price)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUOTE_JSON: &str = r#"{
        "fromToken": {
            "symbol": "USDC",
            "name": "USD Coin",
            "address": "0x2791bca1f2de4661ed88a30c99a7a9449aa84174",
            "decimals": 6,
            "logoURI": "https://tokens.1inch.exchange/usdc.png"
        },
        "toToken": {
            "symbol": "WETH",
            "name": "Wrapped Ether",
            "address": "0x7ceb23fd6bc0add59e62ac25578270cff1b9f619",
            "decimals": 18,
            "logoURI": "https://tokens.1inch.exchange/weth.png"
        },
        "toTokenAmount": "498765432100000000",
        "fromTokenAmount": "1500000000",
        "protocols": [],
        "estimatedGas": 215000
    }"#;

    const SWAP_JSON: &str = r#"{
        "fromToken": { "symbol": "WETH", "name": "Wrapped Ether", "address": "0x7ceb23fd6bc0add59e62ac25578270cff1b9f619", "decimals": 18 },
        "toToken": { "symbol": "USDC", "name": "USD Coin", "address": "0x2791bca1f2de4661ed88a30c99a7a9449aa84174", "decimals": 6 },
        "toTokenAmount": "1490000000",
        "fromTokenAmount": "500000000000000000",
        "protocols": [],
        "tx": {
            "from": "0xe7cac17029ec86fec53eb2943b0eda049bc335c3",
            "to": "0x11111112542d85b3ef69ae05771c2dccff4faa26",
            "data": "0x7c025200deadbeef",
            "value": "0",
            "gas": 0,
            "gasPrice": "50000000000"
        }
    }"#;

    #[test]
    fn test_endpoint() {
        let client = OneInchClient::new(137);
        assert_eq!(
            client.endpoint("approve/spender"),
            "https://api.1inch.exchange/v3.0/137/approve/spender"
        );

        let client = OneInchClient::new(80001).with_base_url("http://localhost:8080/");
        assert_eq!(client.endpoint("quote"), "http://localhost:8080/80001/quote");
    }

    #[test]
    fn test_empty_api_key_ignored() {
        let client = OneInchClient::new(137).with_api_key(Some(String::new()));
        assert!(client.api_key.is_none());
        let client = OneInchClient::new(137).with_api_key(Some("secret".to_string()));
        assert!(!format!("{client:?}").contains("secret"));
    }

    #[test]
    fn test_deserialize_quote() {
        let raw: RawQuote = serde_json::from_str(QUOTE_JSON).unwrap();
        let quote = Quote::try_from(raw).unwrap();

        assert_eq!(quote.from_token.symbol, "USDC");
        assert_eq!(quote.from_token.decimals, 6);
        assert_eq!(quote.to_token.decimals, 18);
        assert_eq!(quote.from_token_amount, U256::from(1_500_000_000u64));
        assert_eq!(quote.to_token_amount, U256::from(498_765_432_100_000_000u64));
        assert_eq!(quote.estimated_gas, 215_000);
    }

    #[test]
    fn test_deserialize_swap() {
        let raw: RawSwap = serde_json::from_str(SWAP_JSON).unwrap();
        let swap = SwapResponse::try_from(raw).unwrap();

        assert_eq!(
            swap.tx.to,
            "0x11111112542d85b3ef69ae05771c2dccff4faa26".parse::<Address>().unwrap()
        );
        assert_eq!(swap.tx.data.len(), 8);
        assert_eq!(swap.tx.value, U256::ZERO);
        assert_eq!(swap.tx.gas_price, U256::from(50_000_000_000u64));
        assert_eq!(swap.to_token.symbol, "USDC");
    }

    #[test]
    fn test_invalid_amount_rejected() {
        let json = QUOTE_JSON.replace("498765432100000000", "lots");
        let raw: RawQuote = serde_json::from_str(&json).unwrap();
        match Quote::try_from(raw) {
            Err(AggregatorError::InvalidField { field, value }) => {
                assert_eq!(field, "toTokenAmount");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_fetch_spender() {
        let client = OneInchClient::new(137);
        let first = client.spender().await.unwrap();
        let second = client.spender().await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first, Address::ZERO);
    }
}
