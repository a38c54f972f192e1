use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::error::RecognitionError;
use super::transport::RecognitionTransport;
use super::types::RecognitionRequest;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Outcome of one dispatched request, tagged with what it was computed against.
#[derive(Debug, Clone)]
pub struct RecognitionEvent {
    pub document_id: String,
    pub generation: u64,
    /// Raw service body, or why there is none.
    pub outcome: Result<String, RecognitionError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Quiet period (re)started; the request fires if nothing else arrives.
    Scheduled,
    /// A request is already outstanding; this trigger is dropped, not queued.
    DroppedInFlight,
    /// The canvas did not change enough to be worth a request.
    Unchanged,
    ShutDown,
}

/// Clears the in-flight flag however the dispatch ends.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Debounced, single-flight recognition dispatcher for one canvas.
///
/// Must be used from within a tokio runtime. Completed requests are delivered
/// on the receiver returned by [`RecognitionClient::new`].
pub struct RecognitionClient {
    transport: Arc<dyn RecognitionTransport>,
    debounce: Duration,
    timeout: Duration,
    in_flight: Arc<AtomicBool>,
    trigger_seq: Arc<AtomicU64>,
    dispatched: Arc<AtomicU64>,
    events_tx: mpsc::UnboundedSender<RecognitionEvent>,
    cancel_token: CancellationToken,
}

impl RecognitionClient {
    pub fn new(
        transport: Arc<dyn RecognitionTransport>,
        debounce: Duration,
        timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<RecognitionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let client = Self {
            transport,
            debounce,
            timeout,
            in_flight: Arc::new(AtomicBool::new(false)),
            trigger_seq: Arc::new(AtomicU64::new(0)),
            dispatched: Arc::new(AtomicU64::new(0)),
            events_tx,
            cancel_token: CancellationToken::new(),
        };
        (client, events_rx)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of requests that actually went out.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Schedules `request` after the quiet period. A later trigger within the
    /// window supersedes this one.
    pub fn request_recognition(&self, request: RecognitionRequest) -> Trigger {
        self.schedule(request, self.debounce)
    }

    /// Dispatches without waiting for the quiet period.
    pub fn request_now(&self, request: RecognitionRequest) -> Trigger {
        self.schedule(request, Duration::ZERO)
    }

    /// Forgets any trigger still waiting out its quiet period. An outstanding
    /// request is left alone.
    pub fn cancel_pending(&self) {
        self.trigger_seq.fetch_add(1, Ordering::AcqRel);
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
        self.transport.disconnect();
    }

    fn schedule(&self, request: RecognitionRequest, delay: Duration) -> Trigger {
        if self.cancel_token.is_cancelled() {
            return Trigger::ShutDown;
        }
        if self.is_in_flight() {
            log_debug!(
                "recognition already in flight for {}; dropping trigger",
                request.document_id
            );
            return Trigger::DroppedInFlight;
        }

        let seq = self.trigger_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let task = DispatchTask {
            transport: Arc::clone(&self.transport),
            timeout: self.timeout,
            in_flight: Arc::clone(&self.in_flight),
            trigger_seq: Arc::clone(&self.trigger_seq),
            dispatched: Arc::clone(&self.dispatched),
            events_tx: self.events_tx.clone(),
            cancel_token: self.cancel_token.clone(),
        };
        tokio::spawn(task.run(seq, delay, request));
        Trigger::Scheduled
    }
}

impl Drop for RecognitionClient {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

struct DispatchTask {
    transport: Arc<dyn RecognitionTransport>,
    timeout: Duration,
    in_flight: Arc<AtomicBool>,
    trigger_seq: Arc<AtomicU64>,
    dispatched: Arc<AtomicU64>,
    events_tx: mpsc::UnboundedSender<RecognitionEvent>,
    cancel_token: CancellationToken,
}

impl DispatchTask {
    async fn run(self, seq: u64, delay: Duration, request: RecognitionRequest) {
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel_token.cancelled() => return,
            }
        }

        if self.trigger_seq.load(Ordering::Acquire) != seq {
            return;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log_debug!("recognition became busy during quiet period; dropping trigger");
            return;
        }
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        let payload = request.payload();
        let started = Instant::now();
        log_info!(
            "recognition dispatched for {} (generation {}, {} chars)",
            request.document_id,
            request.generation,
            request.raster.as_str().len()
        );

        let reply = tokio::time::timeout(self.timeout, self.transport.recognize(&payload)).await;
        let outcome = match reply {
            Ok(result) => result,
            Err(_) => Err(RecognitionError::Timeout(self.timeout)),
        };

        match &outcome {
            Ok(body) => log_info!(
                "recognition for {} answered in {}ms ({} bytes)",
                request.document_id,
                started.elapsed().as_millis(),
                body.len()
            ),
            Err(err) => log_warn!(
                "recognition for {} failed after {}ms: {err}",
                request.document_id,
                started.elapsed().as_millis()
            ),
        }

        drop(_guard);
        let _ = self.events_tx.send(RecognitionEvent {
            document_id: request.document_id,
            generation: request.generation,
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Raster;
    use crate::recognition::transport::TransportFuture;
    use crate::variables::VariableDictionary;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    const DEBOUNCE: Duration = Duration::from_millis(900);
    const TIMEOUT: Duration = Duration::from_secs(10);

    #[derive(Default)]
    struct ScriptedTransport {
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        hang: bool,
        fail: bool,
    }

    impl RecognitionTransport for ScriptedTransport {
        fn recognize<'a>(&'a self, _payload: &'a Value) -> TransportFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                if self.hang {
                    std::future::pending::<()>().await;
                }
                if self.fail {
                    return Err(RecognitionError::Transport("connection reset".into()));
                }
                Ok(r#"[{"expr":"1+1","result":2}]"#.to_string())
            })
        }
    }

    fn request(generation: u64) -> RecognitionRequest {
        RecognitionRequest {
            raster: Raster::from_encoded("data:image/png;base64,AAAA"),
            variables: VariableDictionary::empty(),
            document_id: "doc".into(),
            generation,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_within_quiet_period_collapse_into_one_request() {
        let transport = Arc::new(ScriptedTransport::default());
        let (client, mut events) = RecognitionClient::new(transport.clone(), DEBOUNCE, TIMEOUT);

        assert_eq!(client.request_recognition(request(0)), Trigger::Scheduled);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(client.request_recognition(request(0)), Trigger::Scheduled);

        let event = events.recv().await.expect("one event");
        assert!(event.outcome.is_ok());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.dispatched(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_fires_before_the_quiet_period_elapses() {
        let transport = Arc::new(ScriptedTransport::default());
        let (client, _events) = RecognitionClient::new(transport.clone(), DEBOUNCE, TIMEOUT);

        client.request_recognition(request(0));
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_while_in_flight_are_dropped() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(ScriptedTransport {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let (client, mut events) = RecognitionClient::new(transport.clone(), DEBOUNCE, TIMEOUT);

        client.request_recognition(request(0));
        tokio::time::sleep(DEBOUNCE + Duration::from_millis(10)).await;
        assert!(client.is_in_flight());
        assert_eq!(client.request_recognition(request(0)), Trigger::DroppedInFlight);

        gate.notify_one();
        events.recv().await.expect("event").outcome.expect("success");
        assert!(!client.is_in_flight());

        assert_eq!(client.request_recognition(request(0)), Trigger::Scheduled);
        gate.notify_one();
        events.recv().await.expect("second event");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_surfaces_error_and_releases_guard() {
        let transport = Arc::new(ScriptedTransport {
            hang: true,
            ..Default::default()
        });
        let (client, mut events) = RecognitionClient::new(transport, DEBOUNCE, TIMEOUT);

        client.request_recognition(request(4));
        let event = events.recv().await.expect("timeout event");
        assert_eq!(event.generation, 4);
        assert_eq!(event.outcome, Err(RecognitionError::Timeout(TIMEOUT)));
        assert!(!client.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_reported_once() {
        let transport = Arc::new(ScriptedTransport {
            fail: true,
            ..Default::default()
        });
        let (client, mut events) = RecognitionClient::new(transport.clone(), DEBOUNCE, TIMEOUT);

        client.request_recognition(request(0));
        let event = events.recv().await.expect("event");
        assert!(matches!(event.outcome, Err(RecognitionError::Transport(_))));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pending_forgets_waiting_trigger() {
        let transport = Arc::new(ScriptedTransport::default());
        let (client, mut events) = RecognitionClient::new(transport.clone(), DEBOUNCE, TIMEOUT);

        client.request_recognition(request(0));
        client.cancel_pending();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(events.try_recv().is_err());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_rejects_new_triggers() {
        let transport = Arc::new(ScriptedTransport::default());
        let (client, _events) = RecognitionClient::new(transport, DEBOUNCE, TIMEOUT);
        client.shutdown();
        assert_eq!(client.request_recognition(request(0)), Trigger::ShutDown);
    }
}
