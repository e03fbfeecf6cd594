use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::table::RouteEntry;

/// Weights of the composite route score:
///
///   `score = alpha * inv_cost + beta * inv_latency + gamma * trust + delta * liquidity`
///
/// Each weight lies in [0, 1] and the four must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of cost efficiency.
    pub alpha: f64,
    /// Weight of latency efficiency.
    pub beta: f64,
    /// Weight of hop trust.
    pub gamma: f64,
    /// Weight of liquidity headroom.
    pub delta: f64,
}

impl ScoringWeights {
    pub fn new(alpha: f64, beta: f64, gamma: f64, delta: f64) -> Result<Self, RoutingError> {
        let weights = Self {
            alpha,
            beta,
            gamma,
            delta,
        };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), RoutingError> {
        let sum = self.alpha + self.beta + self.gamma + self.delta;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(RoutingError::InvalidWeights { sum });
        }
        Ok(())
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            beta: 0.2,
            gamma: 0.3,
            delta: 0.2,
        }
    }
}

/// Normalisation context derived from one candidate set.
///
/// Fees, latencies, and liquidity are measured against the maximum observed
/// in the set, so each component lands in (0, 1] and the weights stay
/// meaningful regardless of whether the corridor moves cents or millions.
/// Scores from different contexts are not comparable.
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext {
    pub max_fee: u128,
    pub max_latency_ms: u64,
    pub max_liquidity: u128,
}

impl ScoreContext {
    /// Measure the candidate set. `amount` fixes each entry's fee.
    pub fn from_entries(entries: &[RouteEntry], amount: u128) -> Self {
        let mut max_fee = 0u128;
        let mut max_latency_ms = 0u64;
        let mut max_liquidity = 0u128;
        for entry in entries {
            max_fee = max_fee.max(entry.fee_for(amount));
            max_latency_ms = max_latency_ms.max(entry.latency_ms);
            max_liquidity = max_liquidity.max(entry.liquidity);
        }
        Self {
            max_fee,
            max_latency_ms,
            max_liquidity,
        }
    }
}

/// A scored hop, with the components kept for transparency.
#[derive(Debug, Clone, PartialEq)]
pub struct HopScore {
    /// Composite value in (0, 1]. Higher is better.
    pub value: f64,
    pub cost_component: f64,
    pub latency_component: f64,
    pub trust_component: f64,
    pub liquidity_component: f64,
}

impl HopScore {
    /// Score one hop within its candidate set.
    ///
    /// Inverse terms keep the `1 / (1 + x)` shape with `x` already
    /// normalised: `x = fee / max_fee` and `x = latency / max_latency`.
    /// A set whose maximum is zero scores that component perfect.
    pub fn compute(
        entry: &RouteEntry,
        amount: u128,
        ctx: &ScoreContext,
        weights: &ScoringWeights,
    ) -> Self {
        let cost_component = if ctx.max_fee == 0 {
            1.0
        } else {
            1.0 / (1.0 + entry.fee_for(amount) as f64 / ctx.max_fee as f64)
        };
        let latency_component = if ctx.max_latency_ms == 0 {
            1.0
        } else {
            1.0 / (1.0 + entry.latency_ms as f64 / ctx.max_latency_ms as f64)
        };
        let trust_component = entry.trust_score;
        let liquidity_component = if ctx.max_liquidity == 0 {
            1.0
        } else {
            entry.liquidity as f64 / ctx.max_liquidity as f64
        };

        let value = weights.alpha * cost_component
            + weights.beta * latency_component
            + weights.gamma * trust_component
            + weights.delta * liquidity_component;

        Self {
            value,
            cost_component,
            latency_component,
            trust_component,
            liquidity_component,
        }
    }
}
