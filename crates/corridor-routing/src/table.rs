use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use corridor_core::{Currency, NodeId};

use crate::error::RoutingError;

/// One learned fact about reachability: `next_hop` can move funds to
/// `destination` on the stated terms. Entries double as directed edges of
/// the routing graph, `next_hop -> destination`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Far end of the edge.
    pub destination: NodeId,
    /// Node that does the forwarding.
    pub next_hop: NodeId,
    /// Currencies carried on this edge.
    pub supported_currencies: Vec<Currency>,
    /// Liquidity available, in atomic units of the carried currencies.
    pub liquidity: u128,
    /// Fee rate as a fraction of the forwarded amount.
    pub fee_rate: f64,
    /// Average observed latency in milliseconds.
    pub latency_ms: u64,
    /// Trust in the forwarding node, in [0,1]. Always sourced from the
    /// trust oracle at ingestion, never from the peer's own claim.
    pub trust_score: f64,
    /// Absolute instant after which the entry is dead.
    pub expires_at: DateTime<Utc>,
    /// Advertised distance of the destination, used to bound re-broadcast.
    pub hop_count: u32,
}

impl RouteEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn supports_currency(&self, currency: &Currency) -> bool {
        self.supported_currencies.contains(currency)
    }

    /// Fee charged for forwarding `amount`, rounded up.
    pub fn fee_for(&self, amount: u128) -> u128 {
        ((amount as f64) * self.fee_rate).ceil() as u128
    }

    pub fn validate(&self) -> Result<(), RoutingError> {
        if !(0.0..=1.0).contains(&self.fee_rate) {
            return Err(RoutingError::InvalidEntry {
                reason: format!("fee_rate out of range [0, 1]: {}", self.fee_rate),
            });
        }
        if !(0.0..=1.0).contains(&self.trust_score) {
            return Err(RoutingError::InvalidEntry {
                reason: format!("trust_score out of range [0, 1]: {}", self.trust_score),
            });
        }
        if self.supported_currencies.is_empty() {
            return Err(RoutingError::InvalidEntry {
                reason: "supported_currencies is empty".into(),
            });
        }
        Ok(())
    }
}

type RouteKey = (NodeId, NodeId);

/// Concurrent route table keyed by `(destination, next_hop)`.
///
/// Sharded locking via DashMap: writers touching different keys do not
/// contend and readers never take a table-wide lock. The last upsert for a
/// key wins by arrival order; there is no sequence-number arbitration.
pub struct RouteTable {
    entries: DashMap<RouteKey, RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Validate and insert or replace the entry for its `(destination,
    /// next_hop)` key. Returns the entry it displaced, if any.
    pub fn upsert(&self, entry: RouteEntry) -> Result<Option<RouteEntry>, RoutingError> {
        entry.validate()?;
        let key = (entry.destination.clone(), entry.next_hop.clone());
        let previous = self.entries.insert(key, entry);
        Ok(previous)
    }

    /// Candidate next hops for a destination: every entry toward it that is
    /// unexpired at `now` and carries `currency`.
    pub fn lookup_at(
        &self,
        destination: &NodeId,
        currency: &Currency,
        now: DateTime<Utc>,
    ) -> Vec<RouteEntry> {
        self.entries
            .iter()
            .filter(|kv| {
                let e = kv.value();
                e.destination == *destination && !e.is_expired(now) && e.supports_currency(currency)
            })
            .map(|kv| kv.value().clone())
            .collect()
    }

    /// [`Self::lookup_at`] against the current clock.
    pub fn lookup(&self, destination: &NodeId, currency: &Currency) -> Vec<RouteEntry> {
        self.lookup_at(destination, currency, Utc::now())
    }

    /// Drop every entry whose deadline has passed. Returns how many went.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "route entries evicted");
        }
        evicted
    }

    /// Mutate one entry in place. Returns false if the key is absent.
    pub fn update<F>(&self, destination: &NodeId, next_hop: &NodeId, mutate: F) -> bool
    where
        F: FnOnce(&mut RouteEntry),
    {
        let key = (destination.clone(), next_hop.clone());
        match self.entries.get_mut(&key) {
            Some(mut entry) => {
                mutate(entry.value_mut());
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, destination: &NodeId, next_hop: &NodeId) -> Option<RouteEntry> {
        let key = (destination.clone(), next_hop.clone());
        self.entries.remove(&key).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct destinations currently known, sorted.
    pub fn destinations(&self) -> Vec<NodeId> {
        let mut all: Vec<NodeId> = self.entries.iter().map(|kv| kv.key().0.clone()).collect();
        all.sort();
        all.dedup();
        all
    }

    /// Copy of every entry, expired ones included. Pathfinding filters by
    /// its own clock; persistence wants the lot.
    pub fn snapshot(&self) -> Vec<RouteEntry> {
        self.entries.iter().map(|kv| kv.value().clone()).collect()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
