use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use corridor_core::{Amount, NodeId};

use crate::error::SettlementError;

/// State of one hop lock inside a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    /// Not yet placed on the rail.
    Pending,
    /// Placed and waiting for the claim.
    Locked,
    /// Confirmed; funds moved forward.
    Claimed,
    /// Reversed before confirmation.
    RolledBack,
    /// The rail refused or the lock could not be resolved.
    Failed,
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Locked => write!(f, "Locked"),
            Self::Claimed => write!(f, "Claimed"),
            Self::RolledBack => write!(f, "RolledBack"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// One conditional lock along the path. `peer` is the far end that claims
/// the lock by revealing the preimage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopLock {
    /// 0-based position, sender side first.
    pub position: usize,
    pub peer: NodeId,
    /// Rail that holds this lock.
    pub layer_id: String,
    pub amount: Amount,
    /// Absolute expiry; strictly decreases toward the receiver.
    pub expires_at: DateTime<Utc>,
    pub state: LockState,
    /// Backend reference once the lock is placed.
    pub transaction_id: Option<String>,
}

impl HopLock {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Fresh random 32-byte preimage.
pub fn generate_preimage() -> [u8; 32] {
    let mut preimage = [0u8; 32];
    rand::thread_rng().fill(&mut preimage[..]);
    preimage
}

/// BLAKE3 commitment to a preimage.
pub fn commitment(preimage: &[u8]) -> [u8; 32] {
    *blake3::hash(preimage).as_bytes()
}

/// Per-payment hash time-locked cascade.
///
/// A value object: it carries the preimage, the commitment, and the
/// ordered hop locks for exactly one payment. Concurrent payments never
/// share cascade state. Expiries decrease from sender to receiver so an
/// upstream lock always outlives its downstream neighbour by the margin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtlcCascade {
    pub payment_id: Uuid,
    pub sender: NodeId,
    pub preimage: [u8; 32],
    pub commitment: [u8; 32],
    pub locks: Vec<HopLock>,
    pub created_at: DateTime<Utc>,
}

impl HtlcCascade {
    /// Build a cascade for hops listed sender side first. Hop `k` of `n`
    /// expires at `now + min_lock + (n-1-k) * margin`.
    pub fn build(
        payment_id: Uuid,
        sender: NodeId,
        hops: Vec<(NodeId, String, Amount)>,
        min_lock: Duration,
        margin: Duration,
    ) -> Result<Self, SettlementError> {
        if hops.is_empty() {
            return Err(SettlementError::InvalidCascade(
                "a cascade needs at least one hop".into(),
            ));
        }
        if hops.len() > 1 && margin.is_zero() {
            return Err(SettlementError::InvalidCascade(
                "expiry margin must be positive for multi-hop cascades".into(),
            ));
        }

        let n = hops.len();
        let now = Utc::now();
        let min_lock = chrono::Duration::from_std(min_lock).map_err(|_| {
            SettlementError::InvalidCascade("lock lifetime out of range".into())
        })?;
        let step = chrono::Duration::from_std(margin).map_err(|_| {
            SettlementError::InvalidCascade("expiry margin out of range".into())
        })?;

        let preimage = generate_preimage();
        let locks = hops
            .into_iter()
            .enumerate()
            .map(|(k, (peer, layer_id, amount))| HopLock {
                position: k,
                peer,
                layer_id,
                amount,
                expires_at: now + min_lock + step * ((n - 1 - k) as i32),
                state: LockState::Pending,
                transaction_id: None,
            })
            .collect();

        let cascade = Self {
            payment_id,
            sender,
            preimage,
            commitment: commitment(&preimage),
            locks,
            created_at: now,
        };
        cascade.validate(step)?;
        Ok(cascade)
    }

    /// Check the strictly-decreasing expiry invariant: each lock outlives
    /// its downstream neighbour by at least the margin.
    pub fn validate(&self, margin: chrono::Duration) -> Result<(), SettlementError> {
        if self.locks.is_empty() {
            return Err(SettlementError::InvalidCascade(
                "a cascade needs at least one hop".into(),
            ));
        }
        for pair in self.locks.windows(2) {
            let gap = pair[0].expires_at - pair[1].expires_at;
            if gap < margin || gap <= chrono::Duration::zero() {
                return Err(SettlementError::InvalidCascade(format!(
                    "lock expiries must decrease by at least {}ms between hops {} and {}",
                    margin.num_milliseconds(),
                    pair[0].position + 1,
                    pair[1].position + 1,
                )));
            }
        }
        Ok(())
    }

    pub fn hop_count(&self) -> usize {
        self.locks.len()
    }

    pub fn verify_preimage(&self, candidate: &[u8]) -> bool {
        commitment(candidate) == self.commitment
    }

    pub fn commitment_hex(&self) -> String {
        hex::encode(self.commitment)
    }

    /// Record a placed lock. Only a pending hop can become locked.
    pub fn record_lock(
        &mut self,
        position: usize,
        transaction_id: String,
    ) -> Result<(), SettlementError> {
        let lock = self.lock_at(position)?;
        if lock.state != LockState::Pending {
            return Err(SettlementError::InvalidTransition(format!(
                "cannot lock hop {} in state {}",
                position + 1,
                lock.state
            )));
        }
        lock.state = LockState::Locked;
        lock.transaction_id = Some(transaction_id);
        Ok(())
    }

    /// Record a claimed lock. Only a locked hop can be claimed.
    pub fn record_claim(&mut self, position: usize) -> Result<(), SettlementError> {
        let lock = self.lock_at(position)?;
        if lock.state != LockState::Locked {
            return Err(SettlementError::InvalidTransition(format!(
                "cannot claim hop {} in state {}",
                position + 1,
                lock.state
            )));
        }
        lock.state = LockState::Claimed;
        Ok(())
    }

    /// Record a rolled-back lock. Only a locked hop can be rolled back.
    pub fn record_rollback(&mut self, position: usize) -> Result<(), SettlementError> {
        let lock = self.lock_at(position)?;
        if lock.state != LockState::Locked {
            return Err(SettlementError::InvalidTransition(format!(
                "cannot roll back hop {} in state {}",
                position + 1,
                lock.state
            )));
        }
        lock.state = LockState::RolledBack;
        Ok(())
    }

    /// Mark a hop failed. Terminal hops are left untouched.
    pub fn mark_failed(&mut self, position: usize) {
        if let Some(lock) = self.locks.get_mut(position) {
            if matches!(lock.state, LockState::Pending | LockState::Locked) {
                lock.state = LockState::Failed;
            }
        }
    }

    fn lock_at(&mut self, position: usize) -> Result<&mut HopLock, SettlementError> {
        let hop_count = self.locks.len();
        self.locks.get_mut(position).ok_or_else(|| {
            SettlementError::InvalidCascade(format!(
                "hop {} out of range for a {}-hop cascade",
                position + 1,
                hop_count
            ))
        })
    }
}
