//! Path-based chain routing.
//!
//! Routes are matched from the end of the path so the gateway can live
//! behind arbitrary prefixes (`/relay/v1/ethereum/mainnet` works the same as
//! `/ethereum/mainnet`). A trailing all-digit segment is a chain id; a
//! trailing pair of segments is a `(network, chain)` name lookup.

/// A parsed chain route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainRoute {
    ById(u64),
    ByNames { network: String, name: String },
}

impl ChainRoute {
    /// Parses a request path into a route, or `None` when the path cannot
    /// name a chain (`/`, a single non-numeric segment).
    #[must_use]
    pub fn parse(path: &str) -> Option<ChainRoute> {
        let segments: Vec<&str> =
            path.split('/').filter(|segment| !segment.is_empty()).collect();
        let last = *segments.last()?;

        if last.chars().all(|c| c.is_ascii_digit()) {
            return last.parse().ok().map(ChainRoute::ById);
        }
        if segments.len() >= 2 {
            let network = segments[segments.len() - 2];
            return Some(ChainRoute::ByNames { network: network.to_string(), name: last.to_string() });
        }
        None
    }
}

impl std::fmt::Display for ChainRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainRoute::ById(chain_id) => write!(f, "{chain_id}"),
            ChainRoute::ByNames { network, name } => write!(f, "{network}/{name}"),
        }
    }
}
