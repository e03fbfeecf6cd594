use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::state::PaymentState;
use crate::types::{Amount, NodeId, RoutingHint};

/// A payment in flight through the corridor network.
///
/// Relays treat `metadata` as an opaque blob; only sender and receiver can
/// interpret it. The message carries its own lifecycle state so it can be
/// persisted and recovered as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMessage {
    /// Unique identifier (UUID v7, timestamp-ordered).
    pub id: uuid::Uuid,
    /// Originating node.
    pub sender: NodeId,
    /// Destination node.
    pub receiver: NodeId,
    /// Amount to deliver to the receiver.
    pub amount: Amount,
    /// Opaque end-to-end metadata.
    pub metadata: Vec<u8>,
    /// Time-to-live in seconds, counted from `created_at_ms`.
    pub ttl_secs: u32,
    /// Creation timestamp, Unix milliseconds.
    pub created_at_ms: u64,
    /// Hints for path discovery.
    pub routing_hints: Vec<RoutingHint>,
    /// Current lifecycle state.
    pub state: PaymentState,
}

impl PaymentMessage {
    pub fn builder() -> PaymentBuilder {
        PaymentBuilder::default()
    }

    /// Boundary validation. A message that fails here creates no state.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.is_nil() {
            return Err(CoreError::Validation("payment id must not be nil".into()));
        }
        if self.sender == self.receiver {
            return Err(CoreError::Validation(
                "sender and receiver must differ".into(),
            ));
        }
        if self.amount.is_zero() {
            return Err(CoreError::InvalidAmount(
                "amount must be greater than zero".into(),
            ));
        }
        if self.ttl_secs == 0 {
            return Err(CoreError::Validation("ttl must be greater than zero".into()));
        }
        if self.created_at_ms == 0 {
            return Err(CoreError::Validation("creation timestamp missing".into()));
        }
        Ok(())
    }

    /// Instant after which the payment may no longer enter settlement.
    pub fn expires_at_ms(&self) -> u64 {
        self.created_at_ms + self.ttl_secs as u64 * 1000
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at_ms()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp_millis() as u64)
    }

    /// Stable content digest over the immutable fields. Used for logging
    /// and duplicate detection; excludes lifecycle state.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.id.as_bytes());
        hasher.update(self.sender.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(self.receiver.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(&self.amount.value.to_be_bytes());
        hasher.update(self.amount.currency.code().as_bytes());
        hasher.update(&self.ttl_secs.to_be_bytes());
        hasher.update(&self.created_at_ms.to_be_bytes());
        hasher.update(&self.metadata);
        *hasher.finalize().as_bytes()
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }
}

/// Builder for [`PaymentMessage`].
#[derive(Default)]
pub struct PaymentBuilder {
    sender: Option<NodeId>,
    receiver: Option<NodeId>,
    amount: Option<Amount>,
    metadata: Vec<u8>,
    ttl_secs: u32,
    routing_hints: Vec<RoutingHint>,
}

/// Default TTL when the builder is given none: five minutes.
const DEFAULT_TTL_SECS: u32 = 300;

impl PaymentBuilder {
    pub fn sender(mut self, node: NodeId) -> Self {
        self.sender = Some(node);
        self
    }

    pub fn receiver(mut self, node: NodeId) -> Self {
        self.receiver = Some(node);
        self
    }

    pub fn amount(mut self, amount: Amount) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn metadata(mut self, metadata: Vec<u8>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn ttl_secs(mut self, ttl: u32) -> Self {
        self.ttl_secs = ttl;
        self
    }

    pub fn routing_hint(mut self, hint: RoutingHint) -> Self {
        self.routing_hints.push(hint);
        self
    }

    pub fn build(self) -> Result<PaymentMessage, CoreError> {
        let sender = self
            .sender
            .ok_or_else(|| CoreError::Validation("sender missing".into()))?;
        let receiver = self
            .receiver
            .ok_or_else(|| CoreError::Validation("receiver missing".into()))?;
        let amount = self
            .amount
            .ok_or_else(|| CoreError::Validation("amount missing".into()))?;

        let ttl_secs = if self.ttl_secs > 0 {
            self.ttl_secs
        } else {
            DEFAULT_TTL_SECS
        };

        let payment = PaymentMessage {
            id: uuid::Uuid::now_v7(),
            sender,
            receiver,
            amount,
            metadata: self.metadata,
            ttl_secs,
            created_at_ms: chrono::Utc::now().timestamp_millis() as u64,
            routing_hints: self.routing_hints,
            state: PaymentState::Created,
        };

        payment.validate()?;
        Ok(payment)
    }
}
