//! Route discovery and path selection for the Corridor network.
//!
//! The [`RouteTable`] holds what this node currently believes about who can
//! forward funds where. Beliefs arrive through route advertisements and
//! discovery replies, carry an absolute expiry, and age out. The
//! [`PathFinder`] turns the table into ranked, loop-free candidate paths:
//! every viable hop gets a composite score, Dijkstra runs over edge weight
//! `1 / score`, and Yen's algorithm supplies alternates. Finding nothing is
//! an explicit [`PathSearch::NoRoute`] outcome, not an error.

pub mod advertisement;
pub mod discovery;
pub mod error;
pub mod path;
pub mod pathfinder;
pub mod scoring;
pub mod table;

pub use advertisement::{
    apply_advertisement, DestinationAnnouncement, RouteAdvertisement, ADVERT_TOPIC,
};
pub use discovery::{
    answer_query, ingest_reply, Discovery, RouteOffer, RouteQuery, RouteReply, ROUTE_QUERY_TOPIC,
};
pub use error::RoutingError;
pub use path::CandidatePath;
pub use pathfinder::{NoRouteReason, PathFinder, PathFinderConfig, PathSearch};
pub use scoring::{HopScore, ScoreContext, ScoringWeights};
pub use table::{RouteEntry, RouteTable};
