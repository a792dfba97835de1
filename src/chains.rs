//! Static per-chain registry: endpoints, contract addresses and oracle locations.

use ethers::types::Address;
use std::str::FromStr;

use crate::types::Currency;

pub const ORACLE_BASE_URLS: [&str; 2] = [
    "https://oracle1.deus.finance",
    // "https://oracle2.deus.finance",
    "https://oracle3.deus.finance",
];

/// Node that also serves the asset list and display prices.
pub const INFO_BASE_URL: &str = ORACLE_BASE_URLS[0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedChain {
    Mainnet,
    Bsc,
    Xdai,
    Heco,
    Polygon,
}

pub const SUPPORTED_CHAINS: [SupportedChain; 5] = [
    SupportedChain::Mainnet,
    SupportedChain::Bsc,
    SupportedChain::Xdai,
    SupportedChain::Heco,
    SupportedChain::Polygon,
];

impl SupportedChain {
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            1 => Some(Self::Mainnet),
            56 => Some(Self::Bsc),
            100 => Some(Self::Xdai),
            128 => Some(Self::Heco),
            137 => Some(Self::Polygon),
            _ => None,
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Self::Mainnet => 1,
            Self::Bsc => 56,
            Self::Xdai => 100,
            Self::Heco => 128,
            Self::Polygon => 137,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mainnet => "Ethereum Mainnet",
            Self::Bsc => "Binance Smart Chain Mainnet",
            Self::Xdai => "xDAI Chain",
            Self::Heco => "Huobi ECO Chain Mainnet",
            Self::Polygon => "Matic Mainnet",
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Self::Mainnet => "ETH",
            Self::Bsc => "BNB",
            Self::Xdai => "xDAI",
            Self::Heco => "HT",
            Self::Polygon => "MATIC",
        }
    }

    /// Public RPC endpoint. Mainnet needs an Infura key appended.
    pub fn rpc_url(&self) -> &'static str {
        match self {
            Self::Mainnet => "https://mainnet.infura.io/v3/",
            Self::Bsc => "https://bsc-dataseed1.binance.org",
            Self::Xdai => "https://rpc.xdaichain.com",
            Self::Heco => "https://http-mainnet.hecochain.com",
            Self::Polygon => "https://polygon-rpc.com",
        }
    }

    pub fn explorer_url(&self) -> &'static str {
        match self {
            Self::Mainnet => "https://etherscan.io",
            Self::Bsc => "https://bscscan.com",
            Self::Xdai => "https://blockscout.com/poa/xdai",
            Self::Heco => "https://hecoinfo.com",
            Self::Polygon => "https://polygonscan.com",
        }
    }

    /// Path segment the oracle nodes use for this chain.
    pub fn oracle_network(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Bsc => "bsc",
            Self::Xdai => "xdai",
            Self::Heco => "heco",
            Self::Polygon => "polygon",
        }
    }

    /// Chains whose collateral is the native token, so trades forward value.
    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::Xdai)
    }

    pub fn synchronizer(&self) -> Address {
        parse_address(match self {
            Self::Mainnet => "0x7a27a7BF25d64FAa090404F94606c580ce8E1D37",
            Self::Bsc => "0x3b62f3820e0b035cc4ad602dece6d796bc325325",
            Self::Xdai => "0x89951F2546f36789072c72C94272a68970Eba65e",
            Self::Heco => "0xe82aa18b107aaf8D3829111C91CD0D133E0773DC",
            Self::Polygon => "0x5e16B021994e3c2536435CA3A45f0dA6536eD315",
        })
    }

    pub fn collateral(&self) -> Currency {
        let (address, symbol, decimals) = match self {
            Self::Mainnet => ("0xDE12c7959E1a72bbe8a5f7A1dc8f8EeF9Ab011B3", "DEI", 18),
            Self::Bsc => ("0xe9e7cea3dedca5984780bafc599bd69add087d56", "BUSD", 18),
            Self::Xdai => ("0x0000000000000000000000000000000000000001", "xDAI", 18),
            Self::Heco => ("0x0298c2b32eae4da002a15f36fdf7615bea3da047", "HUSD", 8),
            Self::Polygon => ("0xDE12c7959E1a72bbe8a5f7A1dc8f8EeF9Ab011B3", "DEI", 18),
        };
        Currency::new(parse_address(address), symbol, decimals)
    }

    /// TSLA long, preselected when the trade page has no currency in its route.
    pub fn default_synth(&self) -> Address {
        parse_address(match self {
            Self::Mainnet => "0xc9f982e8f89E1c6626746e93E0B238701892b2f8",
            Self::Bsc => "0x0DA9E2D04b3A7F9C4424171Ee2EE23c88FaC2783",
            Self::Xdai => "0xC1664C5bE0dB8ABae249DCd23ec59E4D665656cB",
            Self::Heco => "0x6C503f804533C554a2dF47604D6630557b8bF1cA",
            Self::Polygon => "0xF4849682B4D8C966a82d9Af3f5ec26B0E2A8Bb97",
        })
    }

    pub fn multicall(&self) -> Address {
        parse_address(match self {
            Self::Mainnet => "0x5BA1e12693Dc8F9c48aAD8770482f4739bEeD696",
            Self::Bsc => "0xa9193376D09C7f31283C54e56D013fCF370Cd9D9",
            Self::Xdai => "0xb5b692a88bdfc81ca69dcb1d924f59f0413a602a",
            Self::Heco => "0xdDCbf776dF3dE60163066A5ddDF2277cB445E0F3",
            Self::Polygon => "0x02817C1e3543c2d908a590F5dB6bc97f933dB4BD",
        })
    }
}

// Table entries are compile-time constants, so a bad literal is a programming error.
fn parse_address(s: &str) -> Address {
    Address::from_str(s).unwrap_or_default()
}

pub fn oracle_urls() -> Vec<url::Url> {
    ORACLE_BASE_URLS
        .iter()
        .filter_map(|u| url::Url::parse(u).ok())
        .collect()
}
