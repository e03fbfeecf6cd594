use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;

use corridor_core::ports::TrustOracle;
use corridor_core::{Currency, NodeId};

use crate::discovery::{ingest_reply, Discovery};
use crate::error::RoutingError;
use crate::path::CandidatePath;
use crate::scoring::{HopScore, ScoreContext, ScoringWeights};
use crate::table::{RouteEntry, RouteTable};

/// Floor applied before inverting a hop score into an edge weight, so a
/// pathological zero score cannot divide by zero.
const MIN_HOP_SCORE: f64 = 1e-9;

/// Tuning for path selection.
#[derive(Debug, Clone)]
pub struct PathFinderConfig {
    /// Longest acceptable path.
    pub max_hops: u32,
    /// How many ranked candidate paths to produce (Yen's k).
    pub max_routes: usize,
    /// Hops below this trust are not viable at all.
    pub min_trust: f64,
    /// Composite score weights.
    pub weights: ScoringWeights,
}

impl Default for PathFinderConfig {
    fn default() -> Self {
        Self {
            max_hops: 10,
            max_routes: 3,
            min_trust: 0.0,
            weights: ScoringWeights::default(),
        }
    }
}

/// Why selection produced nothing. This is an outcome, not an error:
/// callers decide whether it is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoRouteReason {
    /// The table holds nothing at all.
    EmptyTable,
    /// Entries exist, but none survives the currency/liquidity/trust filter.
    NoViableHops,
    /// Viable hops exist but never chain to the destination within the
    /// hop limit.
    Unreachable,
}

impl fmt::Display for NoRouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTable => write!(f, "route table is empty"),
            Self::NoViableHops => write!(f, "no hop satisfies currency and liquidity"),
            Self::Unreachable => write!(f, "destination unreachable within hop limit"),
        }
    }
}

/// Result of path selection.
#[derive(Debug, Clone)]
pub enum PathSearch {
    /// Ranked candidates, best first.
    Found(Vec<CandidatePath>),
    NoRoute(NoRouteReason),
}

impl PathSearch {
    pub fn is_no_route(&self) -> bool {
        matches!(self, Self::NoRoute(_))
    }

    pub fn into_paths(self) -> Option<Vec<CandidatePath>> {
        match self {
            Self::Found(paths) => Some(paths),
            Self::NoRoute(_) => None,
        }
    }
}

/// A scored directed edge of the routing graph.
#[derive(Debug, Clone)]
struct Edge {
    entry: RouteEntry,
    weight: f64,
    fee: u128,
}

/// A partial or complete walk used inside the search.
#[derive(Debug, Clone)]
struct Walk {
    nodes: Vec<NodeId>,
    edges: Vec<RouteEntry>,
    weight: f64,
    fee: u128,
}

impl Walk {
    fn seed(origin: NodeId) -> Self {
        Self {
            nodes: vec![origin],
            edges: Vec::new(),
            weight: 0.0,
            fee: 0,
        }
    }

    fn head(&self) -> Option<&NodeId> {
        self.nodes.last()
    }

    fn visits(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    fn extended(&self, edge: &Edge) -> Self {
        let mut next = self.clone();
        next.nodes.push(edge.entry.destination.clone());
        next.edges.push(edge.entry.clone());
        next.weight += edge.weight;
        next.fee += edge.fee;
        next
    }
}

/// Deterministic ranking: lower weight, then lower cumulative fee, then
/// fewer hops, then lexicographic node sequence.
fn compare_walks(a: &Walk, b: &Walk) -> Ordering {
    a.weight
        .partial_cmp(&b.weight)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.fee.cmp(&b.fee))
        .then_with(|| a.edges.len().cmp(&b.edges.len()))
        .then_with(|| a.nodes.cmp(&b.nodes))
}

/// Max-heap wrapper that surfaces the best walk first.
struct OrderedWalk(Walk);

impl PartialEq for OrderedWalk {
    fn eq(&self, other: &Self) -> bool {
        compare_walks(&self.0, &other.0) == Ordering::Equal
    }
}
impl Eq for OrderedWalk {}
impl PartialOrd for OrderedWalk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrderedWalk {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap pops the maximum, we want the minimum.
        compare_walks(&other.0, &self.0)
    }
}

/// Path selection over the route table.
///
/// Evaluation scores every viable hop with the composite score, then
/// selection runs Dijkstra on edge weight `1 / score` and Yen's algorithm
/// for loop-free alternates. Ranking is fully deterministic.
pub struct PathFinder {
    config: PathFinderConfig,
}

impl PathFinder {
    pub fn new(config: PathFinderConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(PathFinderConfig::default())
    }

    pub fn config(&self) -> &PathFinderConfig {
        &self.config
    }

    /// Run discovery over the overlay, fold replies into the table with
    /// trust re-read from the oracle, then select paths locally. A dead
    /// overlay degrades to selection over what the table already knows.
    pub async fn find_with_discovery(
        &self,
        discovery: &Discovery,
        oracle: &dyn TrustOracle,
        table: &RouteTable,
        from: &NodeId,
        to: &NodeId,
        amount: u128,
        currency: &Currency,
    ) -> Result<PathSearch, RoutingError> {
        match discovery
            .collect(to, currency, amount, self.config.max_hops)
            .await
        {
            Ok(replies) => {
                for reply in replies {
                    let trust = oracle.trust_score(&reply.responder).await;
                    ingest_reply(table, &reply, trust, self.config.max_hops);
                }
            }
            Err(err) => {
                tracing::warn!(%err, "route discovery failed, selecting from local table");
            }
        }
        self.find_paths(table, from, to, amount, currency)
    }

    /// Select up to `max_routes` candidate paths from the local table.
    pub fn find_paths(
        &self,
        table: &RouteTable,
        from: &NodeId,
        to: &NodeId,
        amount: u128,
        currency: &Currency,
    ) -> Result<PathSearch, RoutingError> {
        self.config.weights.validate()?;

        if table.is_empty() {
            return Ok(PathSearch::NoRoute(NoRouteReason::EmptyTable));
        }
        if from == to {
            return Ok(PathSearch::NoRoute(NoRouteReason::Unreachable));
        }

        let graph = self.build_graph(table, amount, currency);
        if graph.is_empty() {
            return Ok(PathSearch::NoRoute(NoRouteReason::NoViableHops));
        }

        let paths = self.k_shortest(&graph, from, to, amount);
        if paths.is_empty() {
            return Ok(PathSearch::NoRoute(NoRouteReason::Unreachable));
        }

        let candidates = paths
            .into_iter()
            .map(|walk| {
                CandidatePath::assemble(walk.edges, currency.clone(), amount, walk.weight)
            })
            .collect();
        Ok(PathSearch::Found(candidates))
    }

    /// Viable edges only: unexpired, currency carried, liquidity covers the
    /// amount (a zero-liquidity hop is excluded outright), trust at or
    /// above the floor. Scores are normalised against this exact set.
    fn build_graph(
        &self,
        table: &RouteTable,
        amount: u128,
        currency: &Currency,
    ) -> HashMap<NodeId, Vec<Edge>> {
        let now = chrono::Utc::now();
        let viable: Vec<RouteEntry> = table
            .snapshot()
            .into_iter()
            .filter(|e| {
                !e.is_expired(now)
                    && e.supports_currency(currency)
                    && e.liquidity > 0
                    && e.liquidity >= amount
                    && e.trust_score >= self.config.min_trust
                    && e.destination != e.next_hop
            })
            .collect();

        let ctx = ScoreContext::from_entries(&viable, amount);
        let mut graph: HashMap<NodeId, Vec<Edge>> = HashMap::new();
        for entry in viable {
            let score = HopScore::compute(&entry, amount, &ctx, &self.config.weights);
            let edge = Edge {
                fee: entry.fee_for(amount),
                weight: 1.0 / score.value.max(MIN_HOP_SCORE),
                entry,
            };
            graph.entry(edge.entry.next_hop.clone()).or_default().push(edge);
        }
        // Stable neighbour order keeps the search deterministic.
        for edges in graph.values_mut() {
            edges.sort_by(|a, b| a.entry.destination.cmp(&b.entry.destination));
        }
        graph
    }

    /// Yen's algorithm: the shortest path, then loop-free deviations.
    fn k_shortest(
        &self,
        graph: &HashMap<NodeId, Vec<Edge>>,
        from: &NodeId,
        to: &NodeId,
        amount: u128,
    ) -> Vec<Walk> {
        let no_edges = HashSet::new();
        let no_nodes = HashSet::new();

        let mut accepted: Vec<Walk> = Vec::new();
        match self.dijkstra(graph, from, to, &no_edges, &no_nodes) {
            Some(best) => accepted.push(best),
            None => return accepted,
        }

        let mut pool: Vec<Walk> = Vec::new();
        while accepted.len() < self.config.max_routes {
            let previous = &accepted[accepted.len() - 1];

            for spur_idx in 0..previous.edges.len() {
                let spur_node = previous.nodes[spur_idx].clone();
                let root_nodes = &previous.nodes[..=spur_idx];

                // Ban every edge a known path takes out of this root.
                let mut banned_edges: HashSet<(NodeId, NodeId)> = HashSet::new();
                for path in &accepted {
                    if path.nodes.len() > spur_idx && path.nodes[..=spur_idx] == *root_nodes {
                        banned_edges.insert((
                            path.nodes[spur_idx].clone(),
                            path.nodes[spur_idx + 1].clone(),
                        ));
                    }
                }
                // Root nodes (spur excluded) must not be revisited.
                let banned_nodes: HashSet<NodeId> =
                    root_nodes[..spur_idx].iter().cloned().collect();

                let remaining_hops = self.config.max_hops.saturating_sub(spur_idx as u32);
                if remaining_hops == 0 {
                    continue;
                }
                let spur = self.dijkstra_capped(
                    graph,
                    &spur_node,
                    to,
                    &banned_edges,
                    &banned_nodes,
                    remaining_hops,
                );
                let Some(spur_walk) = spur else { continue };

                let mut candidate = Walk {
                    nodes: previous.nodes[..spur_idx].to_vec(),
                    edges: previous.edges[..spur_idx].to_vec(),
                    weight: 0.0,
                    fee: 0,
                };
                candidate.nodes.extend(spur_walk.nodes);
                candidate.edges.extend(spur_walk.edges);
                candidate.weight = recompute_weight(graph, &candidate.edges);
                candidate.fee = candidate.edges.iter().map(|e| e.fee_for(amount)).sum();

                let duplicate = accepted
                    .iter()
                    .chain(pool.iter())
                    .any(|p| p.nodes == candidate.nodes);
                if !duplicate {
                    pool.push(candidate);
                }
            }

            if pool.is_empty() {
                break;
            }
            pool.sort_by(compare_walks);
            accepted.push(pool.remove(0));
        }

        accepted.sort_by(compare_walks);
        accepted
    }

    fn dijkstra(
        &self,
        graph: &HashMap<NodeId, Vec<Edge>>,
        from: &NodeId,
        to: &NodeId,
        banned_edges: &HashSet<(NodeId, NodeId)>,
        banned_nodes: &HashSet<NodeId>,
    ) -> Option<Walk> {
        self.dijkstra_capped(graph, from, to, banned_edges, banned_nodes, self.config.max_hops)
    }

    /// Hop-capped Dijkstra keyed by `(node, hops_used)` so a longer but
    /// shorter-weighted prefix cannot shadow the only path that fits the
    /// hop budget.
    fn dijkstra_capped(
        &self,
        graph: &HashMap<NodeId, Vec<Edge>>,
        from: &NodeId,
        to: &NodeId,
        banned_edges: &HashSet<(NodeId, NodeId)>,
        banned_nodes: &HashSet<NodeId>,
        max_hops: u32,
    ) -> Option<Walk> {
        if banned_nodes.contains(from) {
            return None;
        }

        let mut heap = BinaryHeap::new();
        heap.push(OrderedWalk(Walk::seed(from.clone())));
        let mut best: HashMap<(NodeId, u32), f64> = HashMap::new();

        while let Some(OrderedWalk(walk)) = heap.pop() {
            let Some(here) = walk.head().cloned() else {
                continue;
            };
            if here == *to {
                return Some(walk);
            }
            if walk.edges.len() as u32 >= max_hops {
                continue;
            }

            let key = (here.clone(), walk.edges.len() as u32);
            match best.get(&key) {
                Some(&w) if walk.weight >= w => continue,
                _ => {
                    best.insert(key, walk.weight);
                }
            }

            let Some(edges) = graph.get(&here) else { continue };
            for edge in edges {
                let next = &edge.entry.destination;
                if banned_nodes.contains(next)
                    || banned_edges.contains(&(here.clone(), next.clone()))
                    || walk.visits(next)
                {
                    continue;
                }
                heap.push(OrderedWalk(walk.extended(edge)));
            }
        }
        None
    }
}

/// Re-derive a walk's weight from the graph's scored edges.
fn recompute_weight(graph: &HashMap<NodeId, Vec<Edge>>, entries: &[RouteEntry]) -> f64 {
    entries
        .iter()
        .map(|entry| {
            graph
                .get(&entry.next_hop)
                .and_then(|edges| {
                    edges
                        .iter()
                        .find(|e| e.entry.destination == entry.destination)
                })
                .map(|e| e.weight)
                .unwrap_or(f64::MAX)
        })
        .sum()
}
