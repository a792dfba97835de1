//! Synchronizer call construction.
//!
//! Only CLOSE (sell) trades are allowed. On proxy chains the sell forwards native value, which
//! the contract itself computes through `calculateXdaiAmount`.

use ethers::abi::{parse_abi, Abi, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use tracing::debug;

use crate::chains::SupportedChain;
use crate::error::{TradeError, TradeResult};
use crate::reconcile::SignatureBundle;
use crate::types::{CurrencyAmount, Direction, TradeType};
use crate::wallet::WalletProvider;

const SYNCHRONIZER_ABI: &[&str] = &[
    "function sellFor(address _user, uint256 multiplier, address registrar, uint256 amount, uint256 fee, uint256[] blockNos, uint256[] prices, uint8[] v, bytes32[] r, bytes32[] s)",
    "function sell(address _user, uint256 multiplier, address registrar, uint256 amount, uint256 fee, uint256[] blockNos, uint256[] prices, uint8[] v, bytes32[] r, bytes32[] s) payable",
    "function calculateXdaiAmount(uint256 price, uint256 fee, uint256 amount) view returns (uint256)",
];

/// Everything a trade needs besides the oracle signatures.
#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub account: Option<Address>,
    pub registrar: Option<Address>,
    pub amount_in: Option<CurrencyAmount>,
    pub amount_out: Option<CurrencyAmount>,
    pub trade_type: TradeType,
    pub direction: Direction,
}

impl TradeRequest {
    /// "Trade 1.5 TSLA-L for 300 DEI"
    pub fn summary(&self) -> String {
        match (&self.amount_in, &self.amount_out) {
            (Some(a), Some(b)) => format!(
                "Trade {} {} for {} {}",
                a.to_significant(6),
                a.currency.symbol,
                b.to_significant(6),
                b.currency.symbol
            ),
            _ => "Trade".to_string(),
        }
    }
}

/// Encoded call, ready for gas estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeCall {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl TradeCall {
    pub fn to_transaction(&self) -> TypedTransaction {
        let mut tx = TransactionRequest::new()
            .from(self.from)
            .to(self.to)
            .data(self.data.clone());
        if !self.value.is_zero() {
            tx = tx.value(self.value);
        }
        tx.into()
    }
}

/// Which Synchronizer entry point a trade goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPath {
    Direct,
    Proxy,
}

impl CallPath {
    fn method(&self) -> &'static str {
        match self {
            CallPath::Direct => "sellFor",
            CallPath::Proxy => "sell",
        }
    }
}

pub struct TradeCallBuilder {
    abi: Abi,
    synchronizer: Address,
    path: CallPath,
}

impl TradeCallBuilder {
    pub fn new(chain: SupportedChain) -> TradeResult<Self> {
        let path = if chain.is_proxy() {
            CallPath::Proxy
        } else {
            CallPath::Direct
        };
        Self::with_path(chain.synchronizer(), path)
    }

    pub fn with_path(synchronizer: Address, path: CallPath) -> TradeResult<Self> {
        let abi = parse_abi(SYNCHRONIZER_ABI).map_err(|e| TradeError::Abi(e.to_string()))?;
        Ok(Self {
            abi,
            synchronizer,
            path,
        })
    }

    pub fn synchronizer(&self) -> Address {
        self.synchronizer
    }

    /// Reject a request before any oracle is queried for it.
    pub fn check(&self, request: &TradeRequest) -> TradeResult<()> {
        if request.account.is_none()
            || request.registrar.is_none()
            || request.amount_in.is_none()
            || request.amount_out.is_none()
        {
            return Err(TradeError::MissingDependencies(
                "account, asset and both amounts are required".into(),
            ));
        }
        match (request.trade_type, request.direction) {
            (TradeType::Open, _) => Err(TradeError::UnsupportedOperation(
                "Only selling is allowed.".into(),
            )),
            (TradeType::Close, Direction::Long) | (TradeType::Close, Direction::Short) => Ok(()),
        }
    }

    /// Encode the trade. The proxy path performs one read-only call to price the value.
    pub async fn build(
        &self,
        provider: &dyn WalletProvider,
        request: &TradeRequest,
        bundle: &SignatureBundle,
    ) -> TradeResult<TradeCall> {
        self.check(request)?;
        let (user, registrar, amount) = match (&request.account, &request.registrar, &request.amount_in) {
            (Some(user), Some(registrar), Some(amount)) => (*user, *registrar, amount.raw),
            _ => return Err(TradeError::MissingDependencies("trade request".into())),
        };
        if bundle.is_empty() {
            return Err(TradeError::InsufficientSignatures {
                required: 1,
                received: 0,
            });
        }

        let data = self.encode_input(user, registrar, amount, bundle)?;
        let method = self.path.method();

        let value = match self.path {
            CallPath::Direct => U256::zero(),
            CallPath::Proxy => {
                self.native_value(provider, user, bundle.price_fixed()?, bundle.fee, amount)
                    .await?
            }
        };

        debug!(method, bytes = data.len(), %value, "trade call encoded");

        Ok(TradeCall {
            from: user,
            to: self.synchronizer,
            data,
            value,
        })
    }

    /// ABI-encode the sell for this builder's path; no network access.
    pub fn encode_input(
        &self,
        user: Address,
        registrar: Address,
        amount: U256,
        bundle: &SignatureBundle,
    ) -> TradeResult<Bytes> {
        let args = vec![
            Token::Address(user),
            Token::Uint(bundle.multiplier),
            Token::Address(registrar),
            Token::Uint(amount),
            Token::Uint(bundle.fee),
            Token::Array(bundle.block_nos().into_iter().map(Token::Uint).collect()),
            Token::Array(bundle.prices()?.into_iter().map(Token::Uint).collect()),
            Token::Array(
                bundle
                    .v()
                    .into_iter()
                    .map(|v| Token::Uint(U256::from(v)))
                    .collect(),
            ),
            Token::Array(
                bundle
                    .r()
                    .into_iter()
                    .map(|r| Token::FixedBytes(r.as_bytes().to_vec()))
                    .collect(),
            ),
            Token::Array(
                bundle
                    .s()
                    .into_iter()
                    .map(|s| Token::FixedBytes(s.as_bytes().to_vec()))
                    .collect(),
            ),
        ];
        let data = self.abi.function(self.path.method())?.encode_input(&args)?;
        Ok(data.into())
    }

    async fn native_value(
        &self,
        provider: &dyn WalletProvider,
        from: Address,
        price: U256,
        fee: U256,
        amount: U256,
    ) -> TradeResult<U256> {
        let function = self.abi.function("calculateXdaiAmount")?;
        let data = function.encode_input(&[Token::Uint(price), Token::Uint(fee), Token::Uint(amount)])?;
        let tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(self.synchronizer)
            .data(data)
            .into();

        let output = provider
            .call(&tx)
            .await
            .map_err(|e| TradeError::EstimationFailed(format!("calculateXdaiAmount: {}", e)))?;
        match function.decode_output(&output)?.into_iter().next() {
            Some(Token::Uint(value)) => Ok(value),
            _ => Err(TradeError::Abi("calculateXdaiAmount returned no amount".into())),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Currency, Operation, OracleSignature, SignatureTriple};
    use crate::wallet::{MockWalletProvider, ProviderFailure};
    use ethers::abi::AbiEncode;
    use ethers::types::H256;

    pub fn bundle() -> SignatureBundle {
        let record = |node: usize| OracleSignature {
            node,
            block_no: 100,
            multiplier: U256::from(5),
            fee: U256::from(3_000_000_000_000_000u64),
            price: "1.2345".into(),
            sign: SignatureTriple {
                v: 27,
                r: H256::repeat_byte(0xaa),
                s: H256::repeat_byte(0xbb),
            },
        };
        SignatureBundle {
            operation: Operation::Sell,
            price: "1.2345".into(),
            multiplier: U256::from(5),
            fee: U256::from(3_000_000_000_000_000u64),
            records: vec![record(0), record(1)],
        }
    }

    pub fn request(trade_type: TradeType) -> TradeRequest {
        let synth = Currency::new(Address::repeat_byte(0x51), "TSLA-L", 18);
        let dei = Currency::new(Address::repeat_byte(0xde), "DEI", 18);
        TradeRequest {
            account: Some(Address::repeat_byte(0x01)),
            registrar: Some(synth.address),
            amount_in: Some(CurrencyAmount::from_raw(synth, U256::exp10(18))),
            amount_out: Some(CurrencyAmount::from_raw(dei, U256::from(1_230_000_000_000_000_000u64))),
            trade_type,
            direction: Direction::Long,
        }
    }

    #[tokio::test]
    async fn test_direct_call_is_deterministic() {
        let builder = TradeCallBuilder::with_path(Address::repeat_byte(0x99), CallPath::Direct).unwrap();
        let provider = MockWalletProvider::new();

        let a = builder.build(&provider, &request(TradeType::Close), &bundle()).await.unwrap();
        let b = builder.build(&provider, &request(TradeType::Close), &bundle()).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a.to, Address::repeat_byte(0x99));
        assert!(a.value.is_zero());
        let selector = ethers::utils::id(
            "sellFor(address,uint256,address,uint256,uint256,uint256[],uint256[],uint8[],bytes32[],bytes32[])",
        );
        assert_eq!(&a.data[..4], &selector[..]);
    }

    #[tokio::test]
    async fn test_open_is_unsupported() {
        let builder = TradeCallBuilder::new(SupportedChain::Bsc).unwrap();
        let provider = MockWalletProvider::new();
        for direction in [Direction::Long, Direction::Short] {
            let mut req = request(TradeType::Open);
            req.direction = direction;
            let err = builder.build(&provider, &req, &bundle()).await.unwrap_err();
            assert!(matches!(err, TradeError::UnsupportedOperation(_)));
        }
    }

    #[tokio::test]
    async fn test_missing_dependencies() {
        let builder = TradeCallBuilder::new(SupportedChain::Bsc).unwrap();
        let provider = MockWalletProvider::new();
        let mut req = request(TradeType::Close);
        req.account = None;
        let err = builder.build(&provider, &req, &bundle()).await.unwrap_err();
        assert!(matches!(err, TradeError::MissingDependencies(_)));
    }

    #[tokio::test]
    async fn test_proxy_path_forwards_value() {
        let builder = TradeCallBuilder::new(SupportedChain::Xdai).unwrap();
        let mut provider = MockWalletProvider::new();
        provider
            .expect_call()
            .times(1)
            .returning(|_| Ok(Bytes::from(U256::from(777u64).encode())));

        let call = builder.build(&provider, &request(TradeType::Close), &bundle()).await.unwrap();
        assert_eq!(call.value, U256::from(777u64));
        assert_eq!(call.to, SupportedChain::Xdai.synchronizer());
        let selector = ethers::utils::id(
            "sell(address,uint256,address,uint256,uint256,uint256[],uint256[],uint8[],bytes32[],bytes32[])",
        );
        assert_eq!(&call.data[..4], &selector[..]);
        assert_eq!(call.to_transaction().value(), Some(&U256::from(777u64)));
    }

    #[tokio::test]
    async fn test_encode_input_matches_build() {
        let builder = TradeCallBuilder::with_path(Address::repeat_byte(0x99), CallPath::Direct).unwrap();
        let req = request(TradeType::Close);
        let call = builder.build(&MockWalletProvider::new(), &req, &bundle()).await.unwrap();
        let data = builder
            .encode_input(Address::repeat_byte(0x01), Address::repeat_byte(0x51), U256::exp10(18), &bundle())
            .unwrap();
        assert_eq!(call.data, data);
    }

    #[tokio::test]
    async fn test_proxy_value_call_failure() {
        let builder = TradeCallBuilder::new(SupportedChain::Xdai).unwrap();
        let mut provider = MockWalletProvider::new();
        provider
            .expect_call()
            .times(1)
            .returning(|_| Err(ProviderFailure::Transport("connection reset".into())));
        provider.expect_send_transaction().never();

        let err = builder.build(&provider, &request(TradeType::Close), &bundle()).await.unwrap_err();
        assert!(matches!(err, TradeError::EstimationFailed(_)));
    }

    #[tokio::test]
    async fn test_proxy_value_call_without_output() {
        let builder = TradeCallBuilder::new(SupportedChain::Xdai).unwrap();
        let mut provider = MockWalletProvider::new();
        provider.expect_call().times(1).returning(|_| Ok(Bytes::new()));
        provider.expect_send_transaction().never();

        let err = builder.build(&provider, &request(TradeType::Close), &bundle()).await.unwrap_err();
        assert!(matches!(err, TradeError::Abi(_)));
    }

    #[test]
    fn test_summary() {
        assert_eq!(request(TradeType::Close).summary(), "Trade 1 TSLA-L for 1.23 DEI");
    }
}
