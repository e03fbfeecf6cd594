use serde::{Deserialize, Serialize};

use corridor_core::{Currency, NodeId};

use crate::error::RoutingError;
use crate::table::RouteEntry;

/// An ordered, loop-free chain of hops from sender to receiver, plus the
/// aggregates path selection ranked it by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePath {
    hops: Vec<RouteEntry>,
    currency: Currency,
    amount: u128,
    /// Sum of `1 / hop_score` over the hops. Lower is better.
    weight: f64,
    /// `1 / weight`: collapses to the hop score for single-hop paths and
    /// shrinks as hops pile up. Higher is better.
    score: f64,
}

impl CandidatePath {
    pub(crate) fn assemble(
        hops: Vec<RouteEntry>,
        currency: Currency,
        amount: u128,
        weight: f64,
    ) -> Self {
        let score = if weight > 0.0 { 1.0 / weight } else { 0.0 };
        Self {
            hops,
            currency,
            amount,
            weight,
            score,
        }
    }

    pub fn hops(&self) -> &[RouteEntry] {
        &self.hops
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn amount(&self) -> u128 {
        self.amount
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    /// The nodes visited, sender's first hop origin included:
    /// `[h1.next_hop, h1.destination, h2.destination, ..]`.
    pub fn node_sequence(&self) -> Vec<NodeId> {
        let mut nodes = Vec::with_capacity(self.hops.len() + 1);
        if let Some(first) = self.hops.first() {
            nodes.push(first.next_hop.clone());
        }
        for hop in &self.hops {
            nodes.push(hop.destination.clone());
        }
        nodes
    }

    /// Receiver at the end of the chain.
    pub fn receiver(&self) -> Option<&NodeId> {
        self.hops.last().map(|h| &h.destination)
    }

    /// Cumulative forwarding fee for `self.amount`.
    pub fn total_fee(&self) -> u128 {
        self.hops.iter().map(|h| h.fee_for(self.amount)).sum()
    }

    pub fn total_latency_ms(&self) -> u64 {
        self.hops.iter().map(|h| h.latency_ms).sum()
    }

    /// Worst-case trust along the path.
    pub fn min_trust(&self) -> f64 {
        self.hops
            .iter()
            .map(|h| h.trust_score)
            .fold(1.0, f64::min)
    }

    /// The path can carry at most this much.
    pub fn bottleneck_liquidity(&self) -> u128 {
        self.hops.iter().map(|h| h.liquidity).min().unwrap_or(0)
    }

    /// Structural checks: non-empty, hop ends chain onto the next hop's
    /// start, no node revisited, currency and liquidity hold on every hop.
    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.hops.is_empty() {
            return Err(RoutingError::InvalidEntry {
                reason: "path has no hops".into(),
            });
        }
        for pair in self.hops.windows(2) {
            if pair[1].next_hop != pair[0].destination {
                return Err(RoutingError::InvalidEntry {
                    reason: format!(
                        "broken chain: hop to {} followed by hop from {}",
                        pair[0].destination, pair[1].next_hop
                    ),
                });
            }
        }
        let nodes = self.node_sequence();
        let mut seen = std::collections::HashSet::new();
        for node in &nodes {
            if !seen.insert(node) {
                return Err(RoutingError::InvalidEntry {
                    reason: format!("path revisits {}", node),
                });
            }
        }
        for hop in &self.hops {
            if !hop.supports_currency(&self.currency) {
                return Err(RoutingError::InvalidEntry {
                    reason: format!("hop via {} does not carry {}", hop.next_hop, self.currency),
                });
            }
            if hop.liquidity < self.amount {
                return Err(RoutingError::InvalidEntry {
                    reason: format!("hop via {} lacks liquidity", hop.next_hop),
                });
            }
        }
        Ok(())
    }
}
