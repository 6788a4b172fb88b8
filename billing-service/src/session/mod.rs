use std::sync::Arc;
use std::time::Instant;

use billing_core::{MeterReading, ReadingError, TransactionHistory, TransactionKind, TransactionRecord};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::ledger::{
    contract, submission, BillAmount, BillingCall, ConfirmedReceipt, LedgerClient, LedgerError,
};
use crate::telemetry::{TelemetryClient, TelemetryError};

use alloy::primitives::U256;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("another workflow is already in flight")]
    Busy,
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("telemetry value rejected: {0}")]
    Reading(#[from] ReadingError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Everything the display surface may observe, owned by the controller and
/// mutated only by workflow completions.
#[derive(Debug, Default)]
struct SessionState {
    reading: Option<MeterReading>,
    bill: Option<BillAmount>,
    busy: bool,
    history: TransactionHistory,
}

/// Read-only projection of the session for the display surface.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub reading_kwh: Option<u64>,
    pub bill_wei: Option<String>,
    pub busy: bool,
    pub history: Vec<TransactionRecord>,
}

/// Orchestrates the three billing workflows against the telemetry and ledger
/// clients.
///
/// Exactly one workflow may be in flight at a time; this is enforced here as
/// a hard invariant, not by any display affordance. A workflow invocation
/// while another is outstanding is rejected with [`SessionError::Busy`]. The
/// busy flag is set under the state lock before the first suspending step and
/// cleared unconditionally when the workflow settles.
pub struct BillingSession {
    telemetry: Arc<dyn TelemetryClient>,
    ledger: Arc<dyn LedgerClient>,
    state: Mutex<SessionState>,
}

impl BillingSession {
    pub fn new(telemetry: Arc<dyn TelemetryClient>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            telemetry,
            ledger,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub async fn snapshot(&self) -> SessionView {
        let s = self.state.lock().await;
        SessionView {
            reading_kwh: s.reading.map(|r| r.kwh),
            bill_wei: s.bill.map(|b| b.to_string()),
            busy: s.busy,
            history: s.history.iter().cloned().collect(),
        }
    }

    /// One best-effort snapshot of the meter. On failure the previous reading
    /// is retained. Not a guarded workflow; does not touch the busy flag.
    pub async fn refresh_reading(&self) -> Result<MeterReading, SessionError> {
        let raw = match self.telemetry.latest_value().await {
            Ok(v) => v,
            Err(e) => {
                metrics::counter!("telemetry_fetch_failed_total").increment(1);
                tracing::error!(error = %e, "failed to fetch meter reading");
                return Err(e.into());
            }
        };

        let reading = match MeterReading::from_power_value(raw) {
            Ok(r) => r,
            Err(e) => {
                metrics::counter!("telemetry_fetch_failed_total").increment(1);
                tracing::error!(error = %e, raw, "telemetry value rejected");
                return Err(e.into());
            }
        };

        let mut s = self.state.lock().await;
        s.reading = Some(reading);
        metrics::counter!("telemetry_reading_refreshed_total").increment(1);
        tracing::info!(kwh = reading.kwh, "meter reading refreshed");
        Ok(reading)
    }

    /// Submits the current reading to the contract. With no reading present
    /// this is a silent no-op: no error, no state change, no ledger traffic.
    pub async fn submit_energy(&self) -> Result<Option<TransactionRecord>, SessionError> {
        let reading = {
            let mut s = self.state.lock().await;
            if s.busy {
                return Err(self.reject("submit_energy"));
            }
            let Some(reading) = s.reading else {
                tracing::warn!("no meter reading present; skipping energy submission");
                return Ok(None);
            };
            s.busy = true;
            reading
        };

        let started = Instant::now();
        let outcome = submission::submit_call(
            self.ledger.as_ref(),
            BillingCall::StoreEnergy {
                total_kwh: reading.kwh,
            },
            U256::ZERO,
        )
        .await;

        let mut s = self.state.lock().await;
        s.busy = false;
        match outcome {
            Ok(receipt) => {
                metrics::counter!("energy_submissions_total").increment(1);
                metrics::histogram!("submission_confirm_latency_seconds")
                    .record(started.elapsed().as_secs_f64());
                let record = TransactionRecord::new(
                    TransactionKind::EnergySubmission,
                    reading.kwh.to_string(),
                    format!("{:#x}", receipt.tx_hash),
                );
                s.history.record(record.clone());
                tracing::info!(kwh = reading.kwh, tx = %record.reference, "energy reading stored on chain");
                Ok(Some(record))
            }
            Err(e) => {
                metrics::counter!("energy_submission_failed_total").increment(1);
                tracing::error!(error = %e, "energy submission failed");
                Err(e.into())
            }
        }
    }

    /// Free read-only query of the amount currently owed.
    pub async fn fetch_bill(&self) -> Result<BillAmount, SessionError> {
        self.begin("fetch_bill").await?;

        let outcome = self.query_bill().await;

        let mut s = self.state.lock().await;
        s.busy = false;
        match outcome {
            Ok(bill) => {
                metrics::counter!("bill_fetches_total").increment(1);
                s.bill = Some(bill);
                tracing::info!(bill = %bill, "current bill fetched");
                Ok(bill)
            }
            Err(e) => {
                metrics::counter!("bill_fetch_failed_total").increment(1);
                tracing::error!(error = %e, "bill fetch failed");
                Err(e.into())
            }
        }
    }

    /// Settles the bill. The amount is always re-fetched from the ledger
    /// first; a freshly-zero bill ends the workflow with nothing to pay.
    pub async fn pay_bill(&self) -> Result<Option<TransactionRecord>, SessionError> {
        self.begin("pay_bill").await?;

        let started = Instant::now();
        let outcome = self.pay_bill_inner().await;

        let mut s = self.state.lock().await;
        s.busy = false;
        match outcome {
            Ok(None) => {
                metrics::counter!("bill_payment_nothing_due_total").increment(1);
                tracing::info!("no bill pending");
                Ok(None)
            }
            Ok(Some((amount, receipt))) => {
                metrics::counter!("bill_payments_total").increment(1);
                metrics::histogram!("submission_confirm_latency_seconds")
                    .record(started.elapsed().as_secs_f64());
                let record = TransactionRecord::new(
                    TransactionKind::BillPayment,
                    amount.to_string(),
                    format!("{:#x}", receipt.tx_hash),
                );
                s.history.record(record.clone());
                tracing::info!(amount = %record.amount, tx = %record.reference, "bill paid");
                Ok(Some(record))
            }
            Err(e) => {
                metrics::counter!("bill_payment_failed_total").increment(1);
                tracing::error!(error = %e, "bill payment failed");
                Err(e.into())
            }
        }
    }

    async fn pay_bill_inner(&self) -> Result<Option<(U256, ConfirmedReceipt)>, LedgerError> {
        let due = self.query_bill().await?;
        if due.is_zero() {
            return Ok(None);
        }
        let receipt =
            submission::submit_call(self.ledger.as_ref(), BillingCall::PayBill, due).await?;
        Ok(Some((due, receipt)))
    }

    async fn query_bill(&self) -> Result<U256, LedgerError> {
        let out = self
            .ledger
            .read_call(contract::encode_get_bill())
            .await
            .map_err(LedgerError::Read)?;
        contract::decode_bill(&out)
    }

    async fn begin(&self, workflow: &'static str) -> Result<(), SessionError> {
        let mut s = self.state.lock().await;
        if s.busy {
            return Err(self.reject(workflow));
        }
        s.busy = true;
        Ok(())
    }

    fn reject(&self, workflow: &'static str) -> SessionError {
        metrics::counter!("workflow_rejected_busy_total").increment(1);
        tracing::warn!(workflow, "workflow rejected, another one is in flight");
        SessionError::Busy
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use alloy::primitives::U256;
    use alloy::sol_types::SolCall;

    use crate::ledger::contract::EnergyBilling;
    use crate::ledger::testing::LedgerProbe;
    use crate::ledger::SubmissionStep;

    use super::*;

    struct StaticTelemetry {
        value: Option<f64>,
    }

    #[async_trait::async_trait]
    impl TelemetryClient for StaticTelemetry {
        async fn latest_value(&self) -> Result<f64, TelemetryError> {
            self.value
                .ok_or_else(|| TelemetryError::Malformed("no data".into()))
        }
    }

    struct SequenceTelemetry {
        values: StdMutex<VecDeque<Option<f64>>>,
    }

    #[async_trait::async_trait]
    impl TelemetryClient for SequenceTelemetry {
        async fn latest_value(&self) -> Result<f64, TelemetryError> {
            self.values
                .lock()
                .unwrap()
                .pop_front()
                .flatten()
                .ok_or_else(|| TelemetryError::Malformed("no data".into()))
        }
    }

    fn session(telemetry_value: Option<f64>, ledger: Arc<LedgerProbe>) -> BillingSession {
        BillingSession::new(
            Arc::new(StaticTelemetry {
                value: telemetry_value,
            }),
            ledger,
        )
    }

    #[tokio::test]
    async fn submit_without_a_reading_is_a_silent_noop() {
        let probe = Arc::new(LedgerProbe::default());
        let s = session(Some(17.8), probe.clone());
        // No refresh happened, so no reading is present.
        let res = s.submit_energy().await.unwrap();
        assert!(res.is_none());
        assert!(probe.calls().is_empty());

        let view = s.snapshot().await;
        assert!(!view.busy);
        assert!(view.history.is_empty());
        assert_eq!(view.reading_kwh, None);
    }

    #[tokio::test]
    async fn submission_uses_the_truncated_reading() {
        let probe = Arc::new(LedgerProbe::default());
        let s = session(Some(42.9), probe.clone());
        s.refresh_reading().await.unwrap();
        s.submit_energy().await.unwrap().unwrap();

        let plan = probe.last_signed();
        let decoded = EnergyBilling::storeEnergyCall::abi_decode(&plan.data).unwrap();
        assert_eq!(decoded.totalEnergy, U256::from(42));
        assert_eq!(plan.value, U256::ZERO);
    }

    #[tokio::test]
    async fn history_is_bounded_and_newest_first() {
        let probe = Arc::new(LedgerProbe::default());
        let s = session(Some(17.8), probe.clone());
        s.refresh_reading().await.unwrap();

        for _ in 0..7 {
            s.submit_energy().await.unwrap().unwrap();
        }

        let view = s.snapshot().await;
        assert_eq!(view.history.len(), 5);
        // Front of the history is the seventh (latest) submission.
        assert_eq!(
            view.history[0].reference,
            format!("{:#x}", LedgerProbe::hash_of(7))
        );
        assert_eq!(
            view.history[4].reference,
            format!("{:#x}", LedgerProbe::hash_of(3))
        );
    }

    #[tokio::test]
    async fn fetch_bill_is_idempotent_and_does_not_grow_history() {
        let probe = Arc::new(LedgerProbe::with_bill(U256::from(500)));
        let s = session(Some(17.8), probe.clone());

        let first = s.fetch_bill().await.unwrap();
        let second = s.fetch_bill().await.unwrap();
        assert_eq!(first, U256::from(500));
        assert_eq!(second, U256::from(500));

        let view = s.snapshot().await;
        assert_eq!(view.bill_wei.as_deref(), Some("500"));
        assert!(view.history.is_empty());
        assert_eq!(probe.calls(), vec!["read_call", "read_call"]);
    }

    #[tokio::test]
    async fn paying_a_zero_bill_never_reaches_the_signing_steps() {
        let probe = Arc::new(LedgerProbe::default());
        let s = session(Some(17.8), probe.clone());

        let res = s.pay_bill().await.unwrap();
        assert!(res.is_none());
        assert_eq!(probe.calls(), vec!["read_call"]);

        let view = s.snapshot().await;
        assert!(view.history.is_empty());
        assert!(!view.busy);
    }

    #[tokio::test]
    async fn paying_attaches_the_fresh_bill_as_value() {
        let probe = Arc::new(LedgerProbe::with_bill(U256::from(500)));
        let s = session(Some(17.8), probe.clone());

        let record = s.pay_bill().await.unwrap().unwrap();
        assert_eq!(record.kind, TransactionKind::BillPayment);
        assert_eq!(record.amount, "500");

        let plan = probe.last_signed();
        assert_eq!(plan.value, U256::from(500));
    }

    #[tokio::test]
    async fn a_failed_step_leaves_state_untouched() {
        use SubmissionStep::*;
        for failing in [EstimateGas, FetchGasPrice, FetchNonce, Sign, Submit, AwaitReceipt] {
            let probe = Arc::new(LedgerProbe::failing_at(failing));
            let s = session(Some(17.8), probe.clone());
            s.refresh_reading().await.unwrap();

            let res = s.submit_energy().await;
            match res {
                Err(SessionError::Ledger(LedgerError::Step { step, .. })) => {
                    assert_eq!(step, failing);
                }
                other => panic!("expected step failure at {failing}, got {other:?}"),
            }

            let view = s.snapshot().await;
            assert_eq!(view.reading_kwh, Some(17));
            assert_eq!(view.bill_wei, None);
            assert!(view.history.is_empty());
            assert!(!view.busy);
        }
    }

    #[tokio::test]
    async fn a_second_workflow_is_rejected_while_one_is_in_flight() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let probe = Arc::new(LedgerProbe {
            gate: Some(gate.clone()),
            ..LedgerProbe::default()
        });
        let s = Arc::new(session(Some(17.8), probe));
        s.refresh_reading().await.unwrap();

        let worker = {
            let s = s.clone();
            tokio::spawn(async move { s.submit_energy().await })
        };

        // Wait until the submission has claimed the busy flag.
        for _ in 0..1_000 {
            if s.snapshot().await.busy {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(s.snapshot().await.busy);

        let res = s.fetch_bill().await;
        assert!(matches!(res, Err(SessionError::Busy)));

        gate.notify_one();
        let record = worker.await.unwrap().unwrap().unwrap();
        assert_eq!(record.kind, TransactionKind::EnergySubmission);
        assert!(!s.snapshot().await.busy);
    }

    #[tokio::test]
    async fn failed_telemetry_retains_the_previous_reading() {
        let probe = Arc::new(LedgerProbe::default());
        let telemetry = SequenceTelemetry {
            values: StdMutex::new(VecDeque::from([Some(17.8), None])),
        };
        let s = BillingSession::new(Arc::new(telemetry), probe);

        s.refresh_reading().await.unwrap();
        assert_eq!(s.snapshot().await.reading_kwh, Some(17));

        let res = s.refresh_reading().await;
        assert!(matches!(res, Err(SessionError::Telemetry(_))));
        assert_eq!(s.snapshot().await.reading_kwh, Some(17));
    }

    #[tokio::test]
    async fn end_to_end_billing_round() {
        let probe = Arc::new(LedgerProbe::with_bill(U256::from(500)));
        let s = session(Some(17.8), probe.clone());

        let reading = s.refresh_reading().await.unwrap();
        assert_eq!(reading.kwh, 17);

        let submitted = s.submit_energy().await.unwrap().unwrap();
        assert_eq!(submitted.kind, TransactionKind::EnergySubmission);
        assert_eq!(submitted.amount, "17");

        let bill = s.fetch_bill().await.unwrap();
        assert_eq!(bill, U256::from(500));

        let paid = s.pay_bill().await.unwrap().unwrap();
        assert_eq!(paid.kind, TransactionKind::BillPayment);
        assert_eq!(paid.amount, "500");

        let view = s.snapshot().await;
        assert_eq!(view.history.len(), 2);
        assert_eq!(view.history[0].kind, TransactionKind::BillPayment);
        assert_eq!(view.history[0].amount, "500");
        assert_eq!(view.history[1].kind, TransactionKind::EnergySubmission);
        assert_eq!(view.history[1].amount, "17");
        assert_eq!(view.bill_wei.as_deref(), Some("500"));
        assert!(!view.busy);
    }
}
