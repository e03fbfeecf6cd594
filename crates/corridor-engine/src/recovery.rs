//! Crash recovery. On restart the engine reloads its route checkpoint and
//! reconciles every payment that was mid-settlement, asking the rails what
//! actually happened instead of re-initiating anything.

use corridor_core::state::advance;
use corridor_core::{PaymentEvent, PaymentState};
use corridor_settlement::{LockState, SettlementStatus};

use crate::engine::PaymentEngine;
use crate::error::EngineError;
use crate::storage::PaymentRecord;

/// What a [`PaymentEngine::recover`] pass found and did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub routes_restored: usize,
    pub routes_dropped: usize,
    pub payments_loaded: usize,
    pub payments_resumed: usize,
    pub payments_expired: usize,
}

impl PaymentEngine {
    /// Reload persisted state after a restart. Call before accepting new
    /// submissions.
    ///
    /// Routes come back from the checkpoint minus anything that expired
    /// while the node was down. Payments interrupted in `Settling` are
    /// reconciled against their rails hop by hop; a hop whose lock
    /// confirmed stays claimed, an unconfirmed one is rolled back. Only a
    /// fully claimed cascade recovers to `Settled`, anything less becomes
    /// `Failed`. Pre-settlement payments whose TTL lapsed are expired;
    /// the rest are left where they were.
    pub async fn recover(&self) -> Result<RecoveryReport, EngineError> {
        let mut report = RecoveryReport::default();

        let now = chrono::Utc::now();
        for entry in self.storage.routes()? {
            if entry.is_expired(now) {
                report.routes_dropped += 1;
                continue;
            }
            match self.table.upsert(entry) {
                Ok(_) => report.routes_restored += 1,
                Err(err) => {
                    tracing::warn!(%err, "checkpointed route rejected");
                    report.routes_dropped += 1;
                }
            }
        }
        if report.routes_dropped > 0 {
            self.checkpoint_routes()?;
        }

        for mut record in self.storage.payments()? {
            report.payments_loaded += 1;
            let id = record.payment.id;
            match record.payment.state {
                state if state.is_terminal() => {}
                PaymentState::Failed => {}
                PaymentState::Settling => match self.resume_settling(&mut record).await {
                    Ok(()) => report.payments_resumed += 1,
                    Err(err) => {
                        tracing::error!(payment_id = %id, %err, "settling payment not recovered");
                    }
                },
                _ => {
                    if self.expire_if_due(&mut record)? {
                        report.payments_expired += 1;
                    }
                }
            }
        }

        tracing::info!(
            routes_restored = report.routes_restored,
            routes_dropped = report.routes_dropped,
            payments_loaded = report.payments_loaded,
            payments_resumed = report.payments_resumed,
            payments_expired = report.payments_expired,
            "recovery complete"
        );
        Ok(report)
    }

    /// Reconcile one interrupted cascade against its rails and close the
    /// payment out.
    async fn resume_settling(&self, record: &mut PaymentRecord) -> Result<(), EngineError> {
        let id = record.payment.id;
        let Some(mut cascade) = self.storage.get_cascade(&id)? else {
            // Settling was persisted but the cascade never was, so no lock
            // can exist anywhere.
            record.payment.state =
                advance(PaymentState::Settling, PaymentEvent::SettlementFailed)?;
            record.failure = Some("no cascade on record".into());
            self.persist(record)?;
            return Ok(());
        };

        for k in 0..cascade.hop_count() {
            if cascade.locks[k].state != LockState::Locked {
                continue;
            }
            let Some(tx) = cascade.locks[k].transaction_id.clone() else {
                cascade.mark_failed(k);
                continue;
            };
            let adapter = match self.registry.adapter(&cascade.locks[k].layer_id) {
                Ok(adapter) => adapter,
                Err(err) => {
                    tracing::warn!(payment_id = %id, hop = k + 1, %err, "rail unavailable");
                    cascade.mark_failed(k);
                    continue;
                }
            };
            match adapter.get_status(&tx).await {
                Ok(SettlementStatus::Confirmed) => cascade.record_claim(k)?,
                Ok(SettlementStatus::RolledBack) => cascade.record_rollback(k)?,
                Ok(SettlementStatus::Failed) => cascade.mark_failed(k),
                Ok(SettlementStatus::Pending) => match adapter.rollback(&tx).await {
                    Ok(_) => cascade.record_rollback(k)?,
                    Err(err) => {
                        tracing::warn!(
                            payment_id = %id,
                            hop = k + 1,
                            %err,
                            "rollback failed while reconciling"
                        );
                        cascade.mark_failed(k);
                    }
                },
                Err(err) => {
                    tracing::warn!(payment_id = %id, hop = k + 1, %err, "status check failed");
                    cascade.mark_failed(k);
                }
            }
        }
        self.storage.put_cascade(&cascade)?;

        let all_claimed = cascade
            .locks
            .iter()
            .all(|lock| lock.state == LockState::Claimed);
        if all_claimed {
            record.payment.state =
                advance(PaymentState::Settling, PaymentEvent::SettlementSucceeded)?;
            record.failure = None;
            tracing::info!(payment_id = %id, "interrupted payment had fully settled");
        } else {
            record.payment.state =
                advance(PaymentState::Settling, PaymentEvent::SettlementFailed)?;
            record.failure = Some("interrupted by restart".into());
            tracing::warn!(payment_id = %id, "interrupted payment closed as failed");
        }
        self.persist(record)?;
        self.report_outcomes(&cascade).await;
        Ok(())
    }
}
