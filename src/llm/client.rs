use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::errors::{ClawError, ClawResult};
use crate::llm::decision::{parse_decision, Decision};
use crate::llm::provider::DecisionOracle;

/// Single-flight, rate-spaced front of the decision oracle.
pub struct DecisionClient {
    oracle: Arc<dyn DecisionOracle>,
    min_interval: Duration,
    in_flight: AtomicBool,
    last_call: Mutex<Option<Instant>>,
}

/// Clears the in-flight flag when the call finishes, including on early return.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DecisionClient {
    pub fn new(oracle: Arc<dyn DecisionOracle>, min_interval: Duration) -> Self {
        Self {
            oracle,
            min_interval,
            in_flight: AtomicBool::new(false),
            last_call: Mutex::new(None),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Ask the oracle for the next action. A call made while another is
    /// outstanding is rejected with `OracleBusy`.
    pub async fn decide(&self, prompt: &str) -> ClawResult<Decision> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("oracle call rejected: another request is in flight");
            return Err(ClawError::OracleBusy);
        }
        let _guard = FlightGuard(&self.in_flight);

        {
            let mut last = self.last_call.lock().await;
            if let Some(prev) = *last {
                let elapsed = prev.elapsed();
                if elapsed < self.min_interval {
                    tokio::time::sleep(self.min_interval - elapsed).await;
                }
            }
            *last = Some(Instant::now());
        }

        let started = Instant::now();
        let raw = self.oracle.generate(prompt).await.map_err(|e| match e {
            ClawError::OracleUnavailable(_) => e,
            other => ClawError::OracleUnavailable(other.to_string()),
        })?;
        tracing::debug!(
            oracle = %self.oracle.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            raw_len = raw.len(),
            "oracle responded"
        );

        parse_decision(&raw).ok_or_else(|| {
            let preview: String = raw.chars().take(200).collect();
            tracing::warn!(response = %preview, "oracle response contained no decision");
            ClawError::OracleUnavailable("response did not contain a valid decision".into())
        })
    }
}
