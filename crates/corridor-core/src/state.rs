use std::fmt;

use crate::error::CoreError;

/// Lifecycle states of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PaymentState {
    /// Validated and stored, not yet routed.
    Created,
    /// A candidate path has been selected.
    Routed,
    /// The receiver acknowledged and accepted the payment.
    Accepted,
    /// Hop locks are being placed or claimed.
    Settling,
    /// All hops confirmed. Terminal.
    Settled,
    /// Settlement failed; eligible for a bounded re-route.
    Failed,
    /// TTL ran out before settlement began. Terminal.
    Expired,
    /// Withdrawn by the sender before settlement began. Terminal.
    Cancelled,
}

impl PaymentState {
    /// Whether the payment can never leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Expired | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Routed => "Routed",
            Self::Accepted => "Accepted",
            Self::Settling => "Settling",
            Self::Settled => "Settled",
            Self::Failed => "Failed",
            Self::Expired => "Expired",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that move a payment between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    /// Path selection produced a usable route.
    RouteChosen,
    /// The receiver answered the forward with an acceptance.
    ReceiverAccepted,
    /// The settlement engine began placing locks.
    SettlementStarted,
    /// Every hop confirmed.
    SettlementSucceeded,
    /// The cascade failed and rolled back.
    SettlementFailed,
    /// A failed payment is being retried on an alternate path.
    RetryRoute,
    /// The payment TTL elapsed.
    TtlExpired,
    /// The sender withdrew the payment.
    CancelRequested,
}

impl PaymentEvent {
    /// The state this event drives toward, independent of legality.
    fn target(&self) -> PaymentState {
        match self {
            Self::RouteChosen | Self::RetryRoute => PaymentState::Routed,
            Self::ReceiverAccepted => PaymentState::Accepted,
            Self::SettlementStarted => PaymentState::Settling,
            Self::SettlementSucceeded => PaymentState::Settled,
            Self::SettlementFailed => PaymentState::Failed,
            Self::TtlExpired => PaymentState::Expired,
            Self::CancelRequested => PaymentState::Cancelled,
        }
    }
}

/// Apply an event to a state, enforcing the legal transition table:
///
/// - Created  → Routed    (RouteChosen)
/// - Routed   → Accepted  (ReceiverAccepted)
/// - Accepted → Settling  (SettlementStarted)
/// - Settling → Settled   (SettlementSucceeded)
/// - Settling → Failed    (SettlementFailed)
/// - Failed   → Routed    (RetryRoute)
/// - Created | Routed | Accepted → Expired   (TtlExpired)
/// - Created | Routed | Accepted → Cancelled (CancelRequested)
///
/// Settling can only resolve through the settlement engine; expiry and
/// cancellation of an in-flight cascade surface as SettlementFailed after
/// rollback, never as a direct jump out of Settling.
pub fn advance(current: PaymentState, event: PaymentEvent) -> Result<PaymentState, CoreError> {
    use PaymentEvent as E;
    use PaymentState as S;

    let next = match (current, event) {
        (S::Created, E::RouteChosen) => S::Routed,
        (S::Routed, E::ReceiverAccepted) => S::Accepted,
        (S::Accepted, E::SettlementStarted) => S::Settling,
        (S::Settling, E::SettlementSucceeded) => S::Settled,
        (S::Settling, E::SettlementFailed) => S::Failed,
        (S::Failed, E::RetryRoute) => S::Routed,

        (S::Created | S::Routed | S::Accepted, E::TtlExpired) => S::Expired,
        (S::Created | S::Routed | S::Accepted, E::CancelRequested) => S::Cancelled,

        _ => {
            return Err(CoreError::InvalidStateTransition {
                from: current,
                to: event.target(),
            })
        }
    };

    tracing::debug!(from = %current, to = %next, event = ?event, "payment state transition");
    Ok(next)
}

/// Check legality without applying.
pub fn permitted(current: PaymentState, event: PaymentEvent) -> bool {
    advance(current, event).is_ok()
}
