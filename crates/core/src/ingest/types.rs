use serde::{Deserialize, Serialize};

pub const KNOWN_BLOCKCHAINS: &[&str] = &["ethereum", "polygon", "avalanche", "linea"];

pub const KNOWN_PROTOCOLS: &[&str] = &[
    "uniswap",
    "sushiswap",
    "balancer",
    "curve",
    "compound",
    "aave",
    "dydx",
    "cream",
    "maker",
    "yearn",
    "synthetix",
    "1inch",
    "loopring",
    "bancor",
    "kyber",
    "mstable",
    "dodo",
    "mcdex",
    "perpetual",
    "defiswap",
    "defisaver",
    "defiexplore",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V2 => "v2",
        }
    }
}

/// Optional pagination forwarded as `offset` / `limit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

/// One logical query against the DeFi analytics API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataQuery {
    PoolMetadata {
        blockchain: String,
        pair_address: String,
    },
    PoolMetrics {
        blockchain: String,
        pair_address: String,
    },
    /// Pool metrics without a chain. Ambiguous when the same pair address
    /// exists on more than one chain; prefer [`DataQuery::PoolMetrics`].
    PoolMetricsAnyChain { pair_address: String },
    PoolsByProtocol { protocol: String, page: Page },
    ProtocolMetadata {
        blockchain: String,
        protocol: String,
        page: Page,
    },
    SupportedProtocols { blockchain: String },
}

impl DataQuery {
    pub fn version(&self) -> ApiVersion {
        match self {
            DataQuery::PoolMetadata { .. }
            | DataQuery::ProtocolMetadata { .. }
            | DataQuery::SupportedProtocols { .. } => ApiVersion::V2,
            DataQuery::PoolMetrics { .. }
            | DataQuery::PoolMetricsAnyChain { .. }
            | DataQuery::PoolsByProtocol { .. } => ApiVersion::V1,
        }
    }

    /// Path below `/{version}/defi/`.
    pub fn path(&self) -> &'static str {
        match self {
            DataQuery::PoolMetadata { .. } => "pool/metadata",
            DataQuery::PoolMetrics { .. } | DataQuery::PoolMetricsAnyChain { .. } => {
                "pool/metrics"
            }
            DataQuery::PoolsByProtocol { .. } | DataQuery::ProtocolMetadata { .. } => "pool",
            DataQuery::SupportedProtocols { .. } => "pool/supported_protocols",
        }
    }

    /// Label used in errors and logs, e.g. `v2/defi/pool/metadata`.
    pub fn endpoint(&self) -> String {
        format!("{}/defi/{}", self.version().as_str(), self.path())
    }

    pub fn blockchain(&self) -> Option<&str> {
        match self {
            DataQuery::PoolMetadata { blockchain, .. }
            | DataQuery::PoolMetrics { blockchain, .. }
            | DataQuery::ProtocolMetadata { blockchain, .. }
            | DataQuery::SupportedProtocols { blockchain } => Some(blockchain),
            DataQuery::PoolMetricsAnyChain { .. } | DataQuery::PoolsByProtocol { .. } => None,
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        match self {
            DataQuery::PoolMetadata {
                blockchain,
                pair_address,
            }
            | DataQuery::PoolMetrics {
                blockchain,
                pair_address,
            } => {
                pairs.push(("blockchain", blockchain.clone()));
                pairs.push(("pair_address", pair_address.clone()));
            }
            DataQuery::PoolMetricsAnyChain { pair_address } => {
                pairs.push(("pair_address", pair_address.clone()));
            }
            DataQuery::PoolsByProtocol { protocol, page } => {
                pairs.push(("protocol", protocol.clone()));
                push_page(&mut pairs, page);
            }
            DataQuery::ProtocolMetadata {
                blockchain,
                protocol,
                page,
            } => {
                pairs.push(("blockchain", blockchain.clone()));
                pairs.push(("protocol", protocol.clone()));
                push_page(&mut pairs, page);
            }
            DataQuery::SupportedProtocols { blockchain } => {
                pairs.push(("blockchain", blockchain.clone()));
            }
        }
        pairs
    }
}

fn push_page(pairs: &mut Vec<(&'static str, String)>, page: &Page) {
    if let Some(offset) = page.offset {
        pairs.push(("offset", offset.to_string()));
    }
    if let Some(limit) = page.limit {
        pairs.push(("limit", limit.to_string()));
    }
}

pub fn is_known_blockchain(blockchain: &str) -> bool {
    KNOWN_BLOCKCHAINS
        .iter()
        .any(|b| b.eq_ignore_ascii_case(blockchain))
}

pub fn is_known_protocol(protocol: &str) -> bool {
    KNOWN_PROTOCOLS.iter().any(|p| p.eq_ignore_ascii_case(protocol))
}
