use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::timeout;
use uuid::Uuid;

use corridor_core::{Amount, NodeId};

use crate::adapter::SettlementAdapter;
use crate::error::SettlementError;
use crate::htlc::{HtlcCascade, LockState};
use crate::registry::SettlementRegistry;
use crate::types::SettlementRequest;

/// Timing knobs for hop locks.
#[derive(Debug, Clone)]
pub struct HtlcConfig {
    /// Lifetime of the receiver-side lock; every other lock adds margin.
    pub min_lock: Duration,
    /// Minimum expiry gap between neighbouring hops.
    pub margin: Duration,
    /// Per-operation deadline for adapter calls.
    pub op_timeout: Duration,
}

impl Default for HtlcConfig {
    fn default() -> Self {
        Self {
            min_lock: Duration::from_secs(180),
            margin: Duration::from_secs(60),
            op_timeout: Duration::from_secs(10),
        }
    }
}

/// Why a hop brought the cascade down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The rail refused or errored.
    Adapter(String),
    /// The hop's lock expired before it could be used.
    LockExpired,
    /// The adapter call outlived its deadline.
    Timeout,
    /// Cancellation was requested.
    Cancelled,
    /// Revealed preimage does not match the commitment.
    PreimageMismatch,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adapter(msg) => write!(f, "adapter failure: {}", msg),
            Self::LockExpired => write!(f, "lock expired"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::PreimageMismatch => write!(f, "preimage mismatch"),
        }
    }
}

/// Terminal result of driving one cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CascadeOutcome {
    /// Every hop confirmed.
    Settled,
    /// The cascade failed at the named hop (1-based, sender side first)
    /// and every still-locked hop was rolled back.
    Failed { hop: usize, reason: FailureReason },
}

impl CascadeOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled)
    }
}

/// Drives HTLC cascades across the registered rails.
///
/// Locks run sender to receiver, claims run strictly in reverse, and any
/// failure rolls back every hop still holding a lock. Rail failures and
/// deadline misses are absorbed into a `Failed` outcome; an `Err` escapes
/// only for invariant breaches the engine must not paper over.
pub struct HtlcEngine {
    registry: Arc<SettlementRegistry>,
    config: HtlcConfig,
}

impl HtlcEngine {
    pub fn new(registry: Arc<SettlementRegistry>, config: HtlcConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &HtlcConfig {
        &self.config
    }

    /// Build a cascade for the given hops using this engine's lock timing.
    pub fn cascade_for(
        &self,
        payment_id: Uuid,
        sender: NodeId,
        hops: Vec<(NodeId, String, Amount)>,
    ) -> Result<HtlcCascade, SettlementError> {
        HtlcCascade::build(
            payment_id,
            sender,
            hops,
            self.config.min_lock,
            self.config.margin,
        )
    }

    /// Drive a cascade to a terminal outcome.
    pub async fn settle(
        &self,
        cascade: &mut HtlcCascade,
        cancel: &watch::Receiver<bool>,
    ) -> Result<CascadeOutcome, SettlementError> {
        let n = cascade.hop_count();
        cascade.validate(self.margin_chrono(n))?;

        // Resolve every rail up front so a bad layer id fails before any
        // lock exists.
        let adapters: Vec<Arc<dyn SettlementAdapter>> = cascade
            .locks
            .iter()
            .map(|lock| self.registry.adapter(&lock.layer_id))
            .collect::<Result<_, _>>()?;

        if n == 1 {
            return self.settle_direct(cascade, &adapters[0], cancel).await;
        }

        tracing::debug!(
            payment_id = %cascade.payment_id,
            hops = n,
            commitment = %cascade.commitment_hex(),
            "starting cascade lock phase"
        );

        // Lock phase, sender side first.
        for k in 0..n {
            if *cancel.borrow() {
                self.rollback_locked(cascade, &adapters).await?;
                return Ok(CascadeOutcome::Failed {
                    hop: k + 1,
                    reason: FailureReason::Cancelled,
                });
            }
            if cascade.locks[k].is_expired_at(Utc::now()) {
                cascade.mark_failed(k);
                self.rollback_locked(cascade, &adapters).await?;
                return Ok(CascadeOutcome::Failed {
                    hop: k + 1,
                    reason: FailureReason::LockExpired,
                });
            }

            let request = self.lock_request(cascade, k, false);
            match timeout(self.config.op_timeout, adapters[k].initiate(request)).await {
                Ok(Ok(result)) => cascade.record_lock(k, result.transaction_id)?,
                Ok(Err(err)) => {
                    tracing::warn!(hop = k + 1, %err, "lock refused");
                    cascade.mark_failed(k);
                    self.rollback_locked(cascade, &adapters).await?;
                    return Ok(CascadeOutcome::Failed {
                        hop: k + 1,
                        reason: FailureReason::Adapter(err.to_string()),
                    });
                }
                Err(_) => {
                    cascade.mark_failed(k);
                    self.rollback_locked(cascade, &adapters).await?;
                    return Ok(CascadeOutcome::Failed {
                        hop: k + 1,
                        reason: FailureReason::Timeout,
                    });
                }
            }
        }

        // A cancellation arriving after the locks are placed degrades to
        // the rollback path; once claims start the cascade runs to the end.
        if *cancel.borrow() {
            self.rollback_locked(cascade, &adapters).await?;
            return Ok(CascadeOutcome::Failed {
                hop: n,
                reason: FailureReason::Cancelled,
            });
        }

        if !cascade.verify_preimage(&cascade.preimage) {
            self.rollback_locked(cascade, &adapters).await?;
            return Ok(CascadeOutcome::Failed {
                hop: n,
                reason: FailureReason::PreimageMismatch,
            });
        }

        // Claim phase, receiver side first. An upstream hop is never
        // confirmed before its downstream neighbour.
        for k in (0..n).rev() {
            if cascade.locks[k].is_expired_at(Utc::now()) {
                // The hop still holds a rail lock; it is rolled back with
                // the rest, not abandoned as failed.
                self.rollback_locked(cascade, &adapters).await?;
                return Ok(CascadeOutcome::Failed {
                    hop: k + 1,
                    reason: FailureReason::LockExpired,
                });
            }
            let transaction_id = match cascade.locks[k].transaction_id.clone() {
                Some(id) => id,
                None => {
                    return Err(SettlementError::Consistency(format!(
                        "hop {} is locked without a transaction id",
                        k + 1
                    )));
                }
            };
            match timeout(
                self.config.op_timeout,
                adapters[k].confirm(&transaction_id),
            )
            .await
            {
                Ok(Ok(_)) => cascade.record_claim(k)?,
                Ok(Err(err)) => {
                    tracing::warn!(hop = k + 1, %err, "claim refused");
                    self.rollback_locked(cascade, &adapters).await?;
                    return Ok(CascadeOutcome::Failed {
                        hop: k + 1,
                        reason: FailureReason::Adapter(err.to_string()),
                    });
                }
                Err(_) => {
                    self.rollback_locked(cascade, &adapters).await?;
                    return Ok(CascadeOutcome::Failed {
                        hop: k + 1,
                        reason: FailureReason::Timeout,
                    });
                }
            }
        }

        tracing::info!(payment_id = %cascade.payment_id, hops = n, "cascade settled");
        Ok(CascadeOutcome::Settled)
    }

    /// Single-hop bypass: one initiate, one confirm, no preimage machinery
    /// and no lock expiry on the request.
    async fn settle_direct(
        &self,
        cascade: &mut HtlcCascade,
        adapter: &Arc<dyn SettlementAdapter>,
        cancel: &watch::Receiver<bool>,
    ) -> Result<CascadeOutcome, SettlementError> {
        if *cancel.borrow() {
            return Ok(CascadeOutcome::Failed {
                hop: 1,
                reason: FailureReason::Cancelled,
            });
        }

        let request = self.lock_request(cascade, 0, true);
        let transaction_id =
            match timeout(self.config.op_timeout, adapter.initiate(request)).await {
                Ok(Ok(result)) => result.transaction_id,
                Ok(Err(err)) => {
                    cascade.mark_failed(0);
                    return Ok(CascadeOutcome::Failed {
                        hop: 1,
                        reason: FailureReason::Adapter(err.to_string()),
                    });
                }
                Err(_) => {
                    cascade.mark_failed(0);
                    return Ok(CascadeOutcome::Failed {
                        hop: 1,
                        reason: FailureReason::Timeout,
                    });
                }
            };
        cascade.record_lock(0, transaction_id.clone())?;

        match timeout(self.config.op_timeout, adapter.confirm(&transaction_id)).await {
            Ok(Ok(_)) => {
                cascade.record_claim(0)?;
                tracing::info!(payment_id = %cascade.payment_id, "direct settlement confirmed");
                Ok(CascadeOutcome::Settled)
            }
            Ok(Err(err)) => {
                self.undo_lock(cascade, adapter, 0).await?;
                Ok(CascadeOutcome::Failed {
                    hop: 1,
                    reason: FailureReason::Adapter(err.to_string()),
                })
            }
            Err(_) => {
                self.undo_lock(cascade, adapter, 0).await?;
                Ok(CascadeOutcome::Failed {
                    hop: 1,
                    reason: FailureReason::Timeout,
                })
            }
        }
    }

    /// Roll back every hop still holding a lock, receiver side first.
    /// Claimed hops are left alone. A hop the rail reports Confirmed while
    /// we are trying to roll it back is a fatal inconsistency.
    async fn rollback_locked(
        &self,
        cascade: &mut HtlcCascade,
        adapters: &[Arc<dyn SettlementAdapter>],
    ) -> Result<(), SettlementError> {
        for k in (0..cascade.hop_count()).rev() {
            if cascade.locks[k].state != LockState::Locked {
                continue;
            }
            self.undo_lock(cascade, &adapters[k], k).await?;
        }
        Ok(())
    }

    async fn undo_lock(
        &self,
        cascade: &mut HtlcCascade,
        adapter: &Arc<dyn SettlementAdapter>,
        k: usize,
    ) -> Result<(), SettlementError> {
        let Some(transaction_id) = cascade.locks[k].transaction_id.clone() else {
            cascade.mark_failed(k);
            return Ok(());
        };
        match timeout(self.config.op_timeout, adapter.rollback(&transaction_id)).await {
            Ok(Ok(_)) => {
                cascade.record_rollback(k)?;
                tracing::debug!(hop = k + 1, "hop lock rolled back");
            }
            Ok(Err(err)) => {
                if let Ok(crate::types::SettlementStatus::Confirmed) =
                    adapter.get_status(&transaction_id).await
                {
                    return Err(SettlementError::Consistency(format!(
                        "hop {} reports Confirmed while being rolled back",
                        k + 1
                    )));
                }
                tracing::warn!(hop = k + 1, %err, "rollback failed");
                cascade.mark_failed(k);
            }
            Err(_) => {
                tracing::warn!(hop = k + 1, "rollback timed out");
                cascade.mark_failed(k);
            }
        }
        Ok(())
    }

    fn lock_request(&self, cascade: &HtlcCascade, k: usize, direct: bool) -> SettlementRequest {
        let from = if k == 0 {
            cascade.sender.clone()
        } else {
            cascade.locks[k - 1].peer.clone()
        };
        let lock = &cascade.locks[k];
        SettlementRequest {
            payment_id: cascade.payment_id,
            amount: lock.amount.clone(),
            from_address: from.as_str().to_string(),
            to_address: lock.peer.as_str().to_string(),
            lock_expiry: if direct { None } else { Some(lock.expires_at) },
        }
    }

    fn margin_chrono(&self, hop_count: usize) -> chrono::Duration {
        if hop_count <= 1 {
            chrono::Duration::zero()
        } else {
            chrono::Duration::from_std(self.config.margin).unwrap_or(chrono::Duration::MAX)
        }
    }
}
