use chrono::Utc;
use serde::{Deserialize, Serialize};

use corridor_core::{Currency, NodeId};

use crate::error::RoutingError;
use crate::table::{RouteEntry, RouteTable};

/// Broadcast topic carrying serialized [`RouteAdvertisement`] payloads.
pub const ADVERT_TOPIC: &str = "corridor.route-advert";

/// One destination the advertiser claims it can reach. `hop_count` is the
/// advertiser's own distance; the ingesting side adds one for the hop to
/// the advertiser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationAnnouncement {
    pub destination: NodeId,
    pub currencies: Vec<Currency>,
    pub liquidity: u128,
    pub fee_rate: f64,
    pub latency_ms: u64,
    pub hop_count: u32,
}

/// A peer's broadcast of reachable destinations. Every announcement shares
/// the advert-level TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteAdvertisement {
    pub origin: NodeId,
    pub announcements: Vec<DestinationAnnouncement>,
    pub ttl_secs: u32,
}

impl RouteAdvertisement {
    /// Announce only this node's direct channels.
    pub fn own(node: &NodeId, table: &RouteTable, ttl_secs: u32) -> Self {
        let now = Utc::now();
        let announcements = table
            .snapshot()
            .into_iter()
            .filter(|e| e.next_hop == *node && !e.is_expired(now))
            .map(announcement_from)
            .collect();
        Self {
            origin: node.clone(),
            announcements,
            ttl_secs,
        }
    }

    /// Re-advertise everything this node knows, one announcement per
    /// destination. Liquidity is this node's own view of the route, and
    /// destinations already at the hop limit are left out because every
    /// ingester would drop them after the bump.
    pub fn readvertise(node: &NodeId, table: &RouteTable, ttl_secs: u32, max_hops: u32) -> Self {
        let now = Utc::now();
        let mut best: std::collections::HashMap<NodeId, RouteEntry> =
            std::collections::HashMap::new();
        for entry in table.snapshot() {
            if entry.is_expired(now) || entry.hop_count >= max_hops {
                continue;
            }
            match best.get(&entry.destination) {
                Some(held) if !prefer(&entry, held) => {}
                _ => {
                    best.insert(entry.destination.clone(), entry);
                }
            }
        }
        let mut announcements: Vec<DestinationAnnouncement> =
            best.into_values().map(announcement_from).collect();
        announcements.sort_by(|a, b| a.destination.cmp(&b.destination));
        Self {
            origin: node.clone(),
            announcements,
            ttl_secs,
        }
    }

    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.ttl_secs == 0 {
            return Err(RoutingError::InvalidAdvertisement {
                reason: "ttl must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Per-destination pick for re-advertisement: nearest first, then the
/// deepest liquidity, then the stable next-hop order.
fn prefer(candidate: &RouteEntry, held: &RouteEntry) -> bool {
    candidate
        .hop_count
        .cmp(&held.hop_count)
        .then_with(|| held.liquidity.cmp(&candidate.liquidity))
        .then_with(|| candidate.next_hop.cmp(&held.next_hop))
        .is_lt()
}

fn announcement_from(entry: RouteEntry) -> DestinationAnnouncement {
    DestinationAnnouncement {
        destination: entry.destination,
        currencies: entry.supported_currencies,
        liquidity: entry.liquidity,
        fee_rate: entry.fee_rate,
        latency_ms: entry.latency_ms,
        hop_count: entry.hop_count,
    }
}

/// Fold a peer's advertisement into the table as edges out of the origin.
///
/// Trust comes from the caller's oracle, never from the wire. The hop
/// count is bumped by one for the hop to the advertiser, and announcements
/// landing past `max_hops` are dropped. Returns how many entries were
/// recorded; the node's own echoed broadcast records nothing.
pub fn apply_advertisement(
    table: &RouteTable,
    advert: &RouteAdvertisement,
    receiver: &NodeId,
    trust_score: f64,
    max_hops: u32,
) -> Result<usize, RoutingError> {
    advert.validate()?;
    if advert.origin == *receiver {
        return Ok(0);
    }

    let now = Utc::now();
    let expires_at = now + chrono::Duration::seconds(i64::from(advert.ttl_secs));
    let mut recorded = 0;
    for ann in &advert.announcements {
        if ann.destination == advert.origin {
            tracing::trace!(origin = %advert.origin, "skipping self-announcement");
            continue;
        }
        if ann.destination == *receiver {
            // A route back to ourselves never appears in our own paths.
            continue;
        }
        let bumped = ann.hop_count + 1;
        if bumped > max_hops {
            continue;
        }
        let entry = RouteEntry {
            destination: ann.destination.clone(),
            next_hop: advert.origin.clone(),
            supported_currencies: ann.currencies.clone(),
            liquidity: ann.liquidity,
            fee_rate: ann.fee_rate,
            latency_ms: ann.latency_ms,
            trust_score,
            expires_at,
            hop_count: bumped,
        };
        match table.upsert(entry) {
            Ok(_) => recorded += 1,
            Err(err) => {
                tracing::debug!(origin = %advert.origin, %err, "discarding bad announcement");
            }
        }
    }
    tracing::debug!(origin = %advert.origin, recorded, "applied route advertisement");
    Ok(recorded)
}
