//! HTTP and JSON-RPC implementations of the collaborator traits.
//!
//! Every outbound call goes through one rate limiter and is retried with
//! exponential backoff. Callers only see the final `anyhow` error.

use crate::gains::collaborators::{
    BalanceSource, PriceHistorySource, TokenInfoSource, TopCoinsSource, TransactionDetailSource,
    TransferSource,
};
use crate::gains::config::{BalanceMode, GainsConfig};
use crate::gains::types::{
    PriceHistory, RawTransfer, TokenSnapshotRecord, TopCoin, TransactionDetail, WalletBalance,
};
use crate::types::same_address;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use moka::future::Cache;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, instrument};

const SELECTOR_BALANCE_OF: &str = "70a08231";
const SELECTOR_DECIMALS: &str = "313ce567";
const SELECTOR_TOTAL_SUPPLY: &str = "18160ddd";

const TRANSFER_START_BLOCK: &str = "1000000";
const TRANSFER_END_BLOCK: &str = "999999999";
const TOP_COINS_LIMIT: usize = 100;
const TOP_COINS_KEY: &str = "top-coins";

/// Response envelope of the block explorer API.
#[derive(Debug, Deserialize)]
struct ScanResponse {
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CovalentResponse<T> {
    data: Option<CovalentItems<T>>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CovalentItems<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CovalentBalance {
    contract_address: String,
    contract_decimals: u8,
    balance: String,
}

#[derive(Debug, Deserialize)]
struct PancakeResponse {
    data: PancakeToken,
}

#[derive(Debug, Deserialize)]
struct PancakeToken {
    #[serde(default)]
    name: Option<String>,
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct LiveRate {
    rate: Option<f64>,
}

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

/// Collaborator implementations backed by the block explorer, the indexer,
/// LiveCoinWatch, PancakeSwap and a BSC JSON-RPC node.
pub struct HttpDataSources {
    http_client: Client,
    config: GainsConfig,
    limiter: DefaultDirectRateLimiter,
    top_coins: Cache<&'static str, Vec<TopCoin>>,
}

impl HttpDataSources {
    pub fn new(config: GainsConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;
        let per_second = NonZeroU32::new(config.rate_limit_requests_per_second)
            .unwrap_or(NonZeroU32::MIN);
        let top_coins = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(config.top_coins_ttl_seconds))
            .build();

        Ok(Self {
            http_client,
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            top_coins,
            config,
        })
    }

    pub fn config(&self) -> &GainsConfig {
        &self.config
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let retry_strategy = ExponentialBackoff::from_millis(100)
            .max_delay(Duration::from_secs(5))
            .take(self.config.retry_attempts);

        Retry::spawn(retry_strategy, op)
            .await
            .with_context(|| format!("{} failed", what))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        what: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        self.with_retries(what, move || async move {
            self.limiter.until_ready().await;
            let response = self
                .http_client
                .get(url)
                .query(query)
                .send()
                .await
                .context("Request failed")?;
            if !response.status().is_success() {
                bail!("HTTP {}", response.status());
            }
            response.json::<T>().await.context("Failed to parse response")
        })
        .await
    }

    async fn post_json<B, T>(&self, what: &str, url: &str, api_key: Option<&str>, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.with_retries(what, move || async move {
            self.limiter.until_ready().await;
            let mut request = self.http_client.post(url).json(body);
            if let Some(key) = api_key {
                request = request.header("x-api-key", key);
            }
            let response = request.send().await.context("Request failed")?;
            if !response.status().is_success() {
                bail!("HTTP {}", response.status());
            }
            response.json::<T>().await.context("Failed to parse response")
        })
        .await
    }

    fn livecoinwatch_key(&self) -> Result<&str> {
        self.config
            .livecoinwatch_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("LCW_API_KEY is not configured"))
    }

    fn covalent_key(&self) -> Result<&str> {
        self.config
            .covalent_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("COVALENT_API_KEY is not configured"))
    }

    /// Current USD rate of `symbol` on LiveCoinWatch.
    #[instrument(skip(self))]
    pub async fn fetch_current_rate(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/coins/single", self.config.livecoinwatch_url);
        let body = json!({"currency": "USD", "code": symbol, "meta": false});
        let live: LiveRate = self
            .post_json("current rate", &url, Some(self.livecoinwatch_key()?), &body)
            .await?;
        live.rate.ok_or_else(|| anyhow!("No current rate for {}", symbol))
    }

    async fn eth_call(&self, contract: &str, data: String) -> Result<BigInt> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "eth_call",
            params: json!([{"to": contract, "data": data}, "latest"]),
        };
        let response: RpcResponse = self
            .post_json("eth_call", &self.config.rpc_url, None, &request)
            .await?;
        if let Some(error) = response.error {
            bail!("eth_call reverted: {}", error.message);
        }
        let result = response
            .result
            .ok_or_else(|| anyhow!("eth_call returned no result"))?;
        parse_hex_quantity(&result)
    }

    /// `balanceOf(wallet)` on `contract`, in raw units.
    pub async fn fetch_raw_balance(&self, wallet: &str, contract: &str) -> Result<BigInt> {
        let data = format!("0x{}{}", SELECTOR_BALANCE_OF, encode_address_arg(wallet)?);
        self.eth_call(contract, data)
            .await
            .context("balanceOf failed")
    }

    pub async fn fetch_decimals(&self, contract: &str) -> Result<u32> {
        let raw = self
            .eth_call(contract, format!("0x{}", SELECTOR_DECIMALS))
            .await
            .context("decimals failed")?;
        // ERC-20 declares decimals() as uint8.
        raw.to_u8()
            .map(u32::from)
            .ok_or_else(|| anyhow!("decimals out of range: {}", raw))
    }

    /// Total supply minus whatever sits in the burn wallet.
    #[instrument(skip(self))]
    pub async fn fetch_circulating_supply(&self, contract: &str) -> Result<BigInt> {
        let total = self
            .eth_call(contract, format!("0x{}", SELECTOR_TOTAL_SUPPLY))
            .await
            .context("totalSupply failed")?;
        let dead = self
            .fetch_raw_balance(&self.config.dead_address, contract)
            .await?;
        debug!("Total supply {}, burned {}", total, dead);
        Ok(total - dead)
    }

    async fn fetch_indexed_balance(&self, wallet: &str, contract: &str) -> Result<WalletBalance> {
        let url = format!(
            "{}/{}/address/{}/balances_v2/",
            self.config.covalent_url, self.config.chain_id, wallet
        );
        let response: CovalentResponse<CovalentBalance> = self
            .get_json("indexed balances", &url, &[("key", self.covalent_key()?)])
            .await?;
        let items = covalent_items(response)?;
        let token = items
            .into_iter()
            .find(|item| same_address(&item.contract_address, contract))
            .ok_or_else(|| anyhow!("Wallet {} holds no {}", wallet, contract))?;
        let raw = token
            .balance
            .parse::<BigInt>()
            .with_context(|| format!("Bad indexed balance {:?}", token.balance))?;
        Ok(WalletBalance {
            raw,
            decimals: u32::from(token.contract_decimals),
        })
    }
}

#[async_trait]
impl TransferSource for HttpDataSources {
    #[instrument(skip(self))]
    async fn fetch_transfers(&self, wallet: &str, contract: &str) -> Result<Vec<RawTransfer>> {
        let api_key = self.config.bscscan_api_key.as_deref().unwrap_or_default();
        let query = [
            ("module", "account"),
            ("action", "tokentx"),
            ("address", wallet),
            ("contractaddress", contract),
            ("startblock", TRANSFER_START_BLOCK),
            ("endblock", TRANSFER_END_BLOCK),
            ("sort", "asc"),
            ("apikey", api_key),
        ];
        let response: ScanResponse = self
            .get_json("transfer history", &self.config.bscscan_url, &query)
            .await?;
        let transfers = transfers_from_scan(response)?;
        debug!("Fetched {} transfer records", transfers.len());
        Ok(transfers)
    }
}

#[async_trait]
impl TransactionDetailSource for HttpDataSources {
    #[instrument(skip(self))]
    async fn fetch_transaction(&self, hash: &str) -> Result<TransactionDetail> {
        let url = format!(
            "{}/{}/transaction_v2/{}/",
            self.config.covalent_url, self.config.chain_id, hash
        );
        let response: CovalentResponse<TransactionDetail> = self
            .get_json("transaction detail", &url, &[("key", self.covalent_key()?)])
            .await?;
        covalent_items(response)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Transaction {} not found", hash))
    }
}

#[async_trait]
impl PriceHistorySource for HttpDataSources {
    #[instrument(skip(self))]
    async fn fetch_history(&self, symbol: &str, timestamp_ms: i64) -> Result<PriceHistory> {
        let url = format!("{}/coins/single/history", self.config.livecoinwatch_url);
        let window = self.config.history_window_ms;
        let body = json!({
            "currency": "USD",
            "code": symbol,
            "start": timestamp_ms - window,
            "end": timestamp_ms + window,
        });
        self.post_json("price history", &url, Some(self.livecoinwatch_key()?), &body)
            .await
    }
}

#[async_trait]
impl TokenInfoSource for HttpDataSources {
    #[instrument(skip(self))]
    async fn fetch_token_snapshot(&self, contract: &str) -> Result<TokenSnapshotRecord> {
        let url = format!("{}/tokens/{}", self.config.pancakeswap_url, contract);
        let token: PancakeResponse = self.get_json("token info", &url, &[]).await?;
        let token = token.data;

        // The live rate is fresher than the DEX aggregate when the symbol is listed.
        let price = match self.fetch_current_rate(&token.symbol).await {
            Ok(rate) => format!("{:.18}", rate),
            Err(e) => {
                debug!("Using DEX price for {}: {:#}", token.symbol, e);
                token.price
            }
        };

        let decimals = self.fetch_decimals(contract).await?;
        let supply = self.fetch_circulating_supply(contract).await?;

        Ok(TokenSnapshotRecord {
            name: token.name,
            symbol: token.symbol,
            decimals,
            price,
            supply: supply.to_string(),
        })
    }
}

#[async_trait]
impl TopCoinsSource for HttpDataSources {
    async fn fetch_top_coins(&self) -> Result<Vec<TopCoin>> {
        let url = format!("{}/coins/list", self.config.livecoinwatch_url);
        self.top_coins
            .try_get_with(TOP_COINS_KEY, async {
                let body = json!({
                    "currency": "USD",
                    "sort": "rank",
                    "order": "ascending",
                    "offset": 0,
                    "limit": TOP_COINS_LIMIT,
                    "meta": true,
                });
                let coins: Vec<TopCoin> = self
                    .post_json("top coins", &url, Some(self.livecoinwatch_key()?), &body)
                    .await?;
                debug!("Fetched {} top coins", coins.len());
                Ok::<_, anyhow::Error>(coins)
            })
            .await
            .map_err(|e| anyhow!("{:#}", e))
    }
}

#[async_trait]
impl BalanceSource for HttpDataSources {
    #[instrument(skip(self))]
    async fn fetch_balance(&self, wallet: &str, contract: &str) -> Result<WalletBalance> {
        match self.config.balance_mode {
            BalanceMode::OnChain => {
                let raw = self.fetch_raw_balance(wallet, contract).await?;
                let decimals = self.fetch_decimals(contract).await?;
                Ok(WalletBalance { raw, decimals })
            }
            BalanceMode::Indexed => self.fetch_indexed_balance(wallet, contract).await,
        }
    }
}

fn transfers_from_scan(response: ScanResponse) -> Result<Vec<RawTransfer>> {
    match response.result {
        serde_json::Value::Array(_) => {
            serde_json::from_value(response.result).context("Failed to parse transfer records")
        }
        serde_json::Value::Null if response.message.contains("No transactions found") => {
            Ok(Vec::new())
        }
        other => bail!("Transfer history error: {} {}", response.message, other),
    }
}

fn covalent_items<T>(response: CovalentResponse<T>) -> Result<Vec<T>> {
    if response.error {
        bail!(
            "Indexer error: {}",
            response.error_message.unwrap_or_else(|| "unknown".to_string())
        );
    }
    Ok(response.data.map(|data| data.items).unwrap_or_default())
}

/// Left-pads a 20-byte address to a 32-byte ABI word.
fn encode_address_arg(address: &str) -> Result<String> {
    let hex = address.trim().trim_start_matches("0x").trim_start_matches("0X");
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Invalid address {:?}", address);
    }
    Ok(format!("{:0>64}", hex.to_lowercase()))
}

/// Parses an RPC hex quantity; `0x` alone is zero.
fn parse_hex_quantity(value: &str) -> Result<BigInt> {
    let hex = value.trim().trim_start_matches("0x");
    if hex.is_empty() {
        return Ok(BigInt::zero());
    }
    BigInt::parse_bytes(hex.as_bytes(), 16).ok_or_else(|| anyhow!("Invalid hex quantity {:?}", value))
}
