//! Oracle signature fetching.
//! Fans out one request per oracle node and keeps every node's outcome, good or bad.

use ethers::types::{Address, H256, U256};
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::chains::SupportedChain;
use crate::error::FetchError;
use crate::types::{OracleSignature, Operation, SignatureTriple};

/// Outcome of one node, indexed like the configured oracle list.
pub type NodeResult = Result<OracleSignature, FetchError>;

/// Integer fields arrive either as JSON numbers or as decimal strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Int(u64),
    Text(String),
}

impl Numeric {
    fn to_u256(&self, field: &str) -> Result<U256, FetchError> {
        match self {
            Numeric::Int(n) => Ok(U256::from(*n)),
            Numeric::Text(s) => U256::from_dec_str(s.trim())
                .map_err(|_| FetchError::Malformed(format!("{} is not an integer: {}", field, s))),
        }
    }

    fn to_u64(&self, field: &str) -> Result<u64, FetchError> {
        let n = self.to_u256(field)?;
        if n > U256::from(u64::MAX) {
            return Err(FetchError::Malformed(format!("{} out of range", field)));
        }
        Ok(n.as_u64())
    }
}

#[derive(Debug, Deserialize)]
struct SignEntry {
    v: Numeric,
    r: String,
    s: String,
}

/// Quote for one contract in a node's `signatures.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteEntry {
    block_no: Numeric,
    multiplier: Numeric,
    fee: Numeric,
    price: Value,
    signs: HashMap<String, SignEntry>,
}

/// Turn a node's raw `signatures.json` body into the record for `contract`/`operation`.
pub fn parse_node_response(
    node: usize,
    body: &str,
    contract: Address,
    operation: Operation,
) -> Result<OracleSignature, FetchError> {
    let quotes: HashMap<String, Value> =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let key = format!("{:?}", contract).to_lowercase();
    let raw = quotes
        .iter()
        .find(|(k, _)| k.to_lowercase() == key)
        .map(|(_, v)| v.clone())
        .ok_or_else(|| FetchError::MissingAsset(key.clone()))?;

    let quote: QuoteEntry =
        serde_json::from_value(raw).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let price = match &quote.price {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => return Err(FetchError::Malformed(format!("price is {}", other))),
    };
    match rust_decimal::Decimal::from_str(&price) {
        Ok(p) if p > rust_decimal::Decimal::ZERO => {}
        Ok(_) => return Err(FetchError::Malformed(format!("price must be positive: {}", price))),
        Err(_) => return Err(FetchError::Malformed(format!("price is not decimal: {}", price))),
    }

    let entry = quote
        .signs
        .get(operation.as_str())
        .ok_or_else(|| FetchError::MissingOperation(operation.as_str().to_string()))?;

    let v = entry.v.to_u64("v")?;
    if v > u8::MAX as u64 {
        return Err(FetchError::Malformed(format!("v out of range: {}", v)));
    }

    Ok(OracleSignature {
        node,
        block_no: quote.block_no.to_u64("blockNo")?,
        multiplier: quote.multiplier.to_u256("multiplier")?,
        fee: quote.fee.to_u256("fee")?,
        price,
        sign: SignatureTriple {
            v: v as u8,
            r: parse_word(&entry.r, "r")?,
            s: parse_word(&entry.s, "s")?,
        },
    })
}

fn parse_word(s: &str, field: &str) -> Result<H256, FetchError> {
    let bytes = hex::decode(s.trim().trim_start_matches("0x"))
        .map_err(|e| FetchError::Malformed(format!("{}: {}", field, e)))?;
    if bytes.len() != 32 {
        return Err(FetchError::Malformed(format!(
            "{} must be 32 bytes, got {}",
            field,
            bytes.len()
        )));
    }
    Ok(H256::from_slice(&bytes))
}

/// HTTP client for the set of independent oracle nodes.
#[derive(Clone)]
pub struct OracleClient {
    http: reqwest::Client,
    nodes: Vec<url::Url>,
}

impl OracleClient {
    pub fn new(nodes: Vec<url::Url>, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { http, nodes })
    }

    pub fn nodes(&self) -> &[url::Url] {
        &self.nodes
    }

    /// `{base}/{network}/signatures.json`
    pub fn signatures_url(base: &url::Url, chain: SupportedChain) -> Result<url::Url, FetchError> {
        base.join(&format!("{}/signatures.json", chain.oracle_network()))
            .map_err(|e| FetchError::Transport(e.to_string()))
    }

    /// Query every node concurrently and wait for all of them to settle.
    pub async fn fetch_signatures(
        &self,
        contract: Address,
        chain: SupportedChain,
        operation: Operation,
    ) -> Vec<NodeResult> {
        let requests = self
            .nodes
            .iter()
            .enumerate()
            .map(|(node, base)| self.fetch_node(node, base, contract, chain, operation));

        let results = join_all(requests).await;
        let ok = results.iter().filter(|r| r.is_ok()).count();
        debug!(
            contract = ?contract,
            operation = operation.as_str(),
            ok,
            total = results.len(),
            "oracle fan-out settled"
        );
        results
    }

    async fn fetch_node(
        &self,
        node: usize,
        base: &url::Url,
        contract: Address,
        chain: SupportedChain,
        operation: Operation,
    ) -> NodeResult {
        let result = self.request(node, base, contract, chain, operation).await;
        if let Err(e) = &result {
            warn!(node, url = %base, error = %e, "oracle node failed");
        }
        result
    }

    async fn request(
        &self,
        node: usize,
        base: &url::Url,
        contract: Address,
        chain: SupportedChain,
        operation: Operation,
    ) -> NodeResult {
        let body = self.get_text(&Self::signatures_url(base, chain)?).await?;
        parse_node_response(node, &body, contract, operation)
    }

    /// GET a document from one node, mapping failures onto `FetchError`.
    pub async fn get_text(&self, url: &url::Url) -> Result<String, FetchError> {
        let response = self.http.get(url.clone()).send().await.map_err(map_reqwest)?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        response.text().await.map_err(map_reqwest)
    }
}

fn map_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    pub const CONTRACT: &str = "0xC1664C5bE0dB8ABae249DCd23ec59E4D665656cB";

    pub fn contract() -> Address {
        Address::from_str(CONTRACT).unwrap()
    }

    pub fn quote_body(block_no: u64, price: &str) -> String {
        format!(
            r#"{{"{}": {{"blockNo": {}, "multiplier": 5, "fee": "3000000000000000", "price": "{}",
                "signs": {{"sell": {{"v": 27, "r": "0x{}", "s": "0x{}"}},
                           "buy": {{"v": "28", "r": "0x{}", "s": "0x{}"}}}}}}}}"#,
            CONTRACT.to_lowercase(),
            block_no,
            price,
            "11".repeat(32),
            "22".repeat(32),
            "33".repeat(32),
            "44".repeat(32),
        )
    }

    /// Serve `body` with `status` once per connection after `delay`.
    async fn serve(status: u16, body: String, delay: Duration) -> url::Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let response = format!(
                        "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        url::Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    #[test]
    fn test_parse_sell_quote() {
        let record = parse_node_response(1, &quote_body(100, "1.2345"), contract(), Operation::Sell).unwrap();
        assert_eq!(record.node, 1);
        assert_eq!(record.block_no, 100);
        assert_eq!(record.multiplier, U256::from(5));
        assert_eq!(record.fee, U256::from(3_000_000_000_000_000u64));
        assert_eq!(record.price, "1.2345");
        assert_eq!(record.sign.v, 27);
        assert_eq!(record.sign.r, H256::repeat_byte(0x11));
    }

    #[test]
    fn test_parse_buy_with_string_v() {
        let record = parse_node_response(0, &quote_body(7, "2"), contract(), Operation::Buy).unwrap();
        assert_eq!(record.sign.v, 28);
        assert_eq!(record.sign.s, H256::repeat_byte(0x44));
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            parse_node_response(0, "not json", contract(), Operation::Sell),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(
            parse_node_response(0, &quote_body(1, "1"), Address::zero(), Operation::Sell),
            Err(FetchError::MissingAsset(_))
        ));
        assert!(matches!(
            parse_node_response(0, &quote_body(1, "abc"), contract(), Operation::Sell),
            Err(FetchError::Malformed(_))
        ));

        for price in ["-1", "0", "0.000"] {
            assert!(matches!(
                parse_node_response(0, &quote_body(1, price), contract(), Operation::Sell),
                Err(FetchError::Malformed(_))
            ));
        }

        let only_buy = quote_body(1, "1").replace("\"sell\"", "\"other\"");
        assert_eq!(
            parse_node_response(0, &only_buy, contract(), Operation::Sell),
            Err(FetchError::MissingOperation("sell".into()))
        );
    }

    #[tokio::test]
    async fn test_fan_out_keeps_partial_failures() {
        let good = serve(200, quote_body(100, "1.2345"), Duration::ZERO).await;
        let broken = serve(500, "oops".into(), Duration::ZERO).await;
        let slow = serve(200, quote_body(100, "1.2345"), Duration::from_secs(5)).await;

        let client = OracleClient::new(vec![good, broken, slow], Duration::from_millis(300)).unwrap();
        let results = client
            .fetch_signatures(contract(), SupportedChain::Xdai, Operation::Sell)
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().price, "1.2345");
        assert_eq!(results[1], Err(FetchError::Status(500)));
        assert_eq!(results[2], Err(FetchError::Timeout));
    }

    #[test]
    fn test_signatures_url() {
        let base = url::Url::parse("https://oracle1.deus.finance").unwrap();
        let url = OracleClient::signatures_url(&base, SupportedChain::Polygon).unwrap();
        assert_eq!(url.as_str(), "https://oracle1.deus.finance/polygon/signatures.json");
    }
}
