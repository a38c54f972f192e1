use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::error::RecognitionError;
use super::transport::{RecognitionTransport, TransportFuture};

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Recognize { request_id: Uuid, payload: Value },
    Disconnect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Result { request_id: Uuid, body: String },
    /// `request_id` is `None` for channel-wide failures.
    Error {
        request_id: Option<Uuid>,
        message: String,
    },
    Closed,
}

/// Client half of a bidirectional message channel.
pub struct ChannelEndpoint {
    pub outbound: mpsc::Sender<OutboundFrame>,
    pub inbound: mpsc::Receiver<InboundEvent>,
}

/// Service half, driven by whatever bridges to the real socket.
pub struct PeerEndpoint {
    pub inbound: mpsc::Receiver<OutboundFrame>,
    pub outbound: mpsc::Sender<InboundEvent>,
}

pub fn channel_pair(capacity: usize) -> (ChannelEndpoint, PeerEndpoint) {
    let (frame_tx, frame_rx) = mpsc::channel(capacity.max(1));
    let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
    (
        ChannelEndpoint {
            outbound: frame_tx,
            inbound: event_rx,
        },
        PeerEndpoint {
            inbound: frame_rx,
            outbound: event_tx,
        },
    )
}

pub trait ChannelConnector: Send + Sync {
    fn connect(&self) -> Result<ChannelEndpoint>;
}

/// Recognition over a persistent channel: emit a request frame, then wait for
/// the result or error event carrying the same request id.
pub struct ChannelTransport {
    outbound: mpsc::Sender<OutboundFrame>,
    inbound: Mutex<mpsc::Receiver<InboundEvent>>,
    connected: AtomicBool,
    /// Requests sent whose reply has not been seen yet, oldest first. Includes
    /// ones the caller gave up on.
    unanswered: std::sync::Mutex<VecDeque<Uuid>>,
}

impl ChannelTransport {
    pub fn connect(connector: &dyn ChannelConnector) -> Result<Self> {
        Ok(Self::from_endpoint(connector.connect()?))
    }

    pub fn from_endpoint(endpoint: ChannelEndpoint) -> Self {
        Self {
            outbound: endpoint.outbound,
            inbound: Mutex::new(endpoint.inbound),
            connected: AtomicBool::new(true),
            unanswered: std::sync::Mutex::new(VecDeque::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn exchange(&self, payload: &Value) -> Result<String, RecognitionError> {
        if !self.is_connected() {
            return Err(RecognitionError::Channel("disconnected".into()));
        }

        // Held across send and receive so replies cannot be claimed by another caller.
        let mut inbound = self.inbound.lock().await;

        let request_id = Uuid::new_v4();
        self.with_unanswered(|ids| ids.push_back(request_id));
        self.outbound
            .send(OutboundFrame::Recognize {
                request_id,
                payload: payload.clone(),
            })
            .await
            .map_err(|_| {
                self.connected.store(false, Ordering::Release);
                RecognitionError::Channel("outbound channel closed".into())
            })?;

        loop {
            match inbound.recv().await {
                Some(InboundEvent::Result { request_id: id, body }) => {
                    self.with_unanswered(|ids| ids.retain(|pending| *pending != id));
                    if id == request_id {
                        return Ok(body);
                    }
                    log::debug!("discarding result for earlier request {id}");
                }
                Some(InboundEvent::Error { request_id: Some(id), message }) => {
                    self.with_unanswered(|ids| ids.retain(|pending| *pending != id));
                    if id == request_id {
                        return Err(RecognitionError::Service(message));
                    }
                    log::debug!("discarding error for earlier request {id}: {message}");
                }
                Some(InboundEvent::Error { request_id: None, message }) => {
                    // Charged to the oldest abandoned request, if there is one.
                    let abandoned = self.with_unanswered(|ids| {
                        let oldest = ids.front().copied()?;
                        if oldest == request_id {
                            return None;
                        }
                        ids.pop_front()
                    });
                    match abandoned {
                        Some(id) => {
                            log::debug!("unattributed error taken as reply to {id}: {message}")
                        }
                        None => {
                            self.with_unanswered(|ids| {
                                ids.retain(|pending| *pending != request_id)
                            });
                            return Err(RecognitionError::Service(message));
                        }
                    }
                }
                Some(InboundEvent::Closed) | None => {
                    self.connected.store(false, Ordering::Release);
                    return Err(RecognitionError::Channel("channel closed".into()));
                }
            }
        }
    }

    fn with_unanswered<T>(&self, f: impl FnOnce(&mut VecDeque<Uuid>) -> T) -> T {
        match self.unanswered.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl RecognitionTransport for ChannelTransport {
    fn recognize<'a>(&'a self, payload: &'a Value) -> TransportFuture<'a> {
        Box::pin(self.exchange(payload))
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            let _ = self.outbound.try_send(OutboundFrame::Disconnect);
        }
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
