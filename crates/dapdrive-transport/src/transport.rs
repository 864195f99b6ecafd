//! The transport handle, reader task and pending-request bookkeeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dapdrive_protocol::ProtocolMessage;
use dapdrive_wire::{encode_message, FramerOutput, MessageFramer};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::TransportError;

/// Default per-request timeout.
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Poison-safe mutex lock that recovers from poisoned state.
fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, ctx: &'static str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("poisoned mutex recovered: {ctx}");
            poisoned.into_inner()
        }
    }
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout applied to each request unless overridden per call.
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { request_timeout: DEFAULT_REQUEST_TIMEOUT }
    }
}

/// Everything the reader task forwards besides responses.
#[derive(Debug)]
pub enum TransportEvent {
    /// An adapter event; subscribers see the event name and body only.
    Event {
        /// Event name (`stopped`, `output`, ...).
        name: String,
        /// Event body.
        body: Option<Value>,
    },
    /// A reverse request from the adapter. The receiver is expected to
    /// answer via [`Transport::send_response`].
    ReverseRequest {
        /// Sequence number to echo in the response.
        seq: i64,
        /// Reverse command (`handshake`, `startDebugging`, ...).
        command: String,
        /// Command arguments.
        arguments: Option<Value>,
    },
    /// A frame whose body was not valid JSON; the frame was dropped.
    ParseError {
        /// The decoder's error rendering.
        error: String,
    },
    /// A line of the adapter process's stderr (stdio transports only).
    Stderr {
        /// The line, without the trailing newline.
        line: String,
    },
    /// The adapter process exited on its own (stdio transports only).
    ProcessExited {
        /// Exit code when the process exited normally.
        code: Option<i32>,
    },
    /// The channel is closed; no further events will arrive.
    Closed,
}

struct PendingEntry {
    command: String,
    tx: oneshot::Sender<Result<Option<Value>, TransportError>>,
}

pub(crate) struct Inner {
    /// Next outgoing sequence number. DAP requires it to start at 1.
    seq: AtomicI64,
    /// Pending requests by sequence number. `None` once closed.
    pending: Mutex<Option<HashMap<i64, PendingEntry>>>,
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    open: AtomicBool,
    /// Signals the process watcher to kill the adapter child, when one exists.
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    request_timeout: Duration,
}

impl Inner {
    fn dispatch(&self, output: FramerOutput) {
        match output {
            FramerOutput::Message(ProtocolMessage::Response {
                request_seq,
                success,
                command,
                message,
                body,
                ..
            }) => {
                let entry = {
                    let mut pending = lock_or_recover(&self.pending, "dispatch.pending");
                    pending.as_mut().and_then(|map| map.remove(&request_seq))
                };
                let Some(entry) = entry else {
                    debug!("response for unknown or timed-out request seq {request_seq} ({command})");
                    return;
                };
                let result = if success {
                    Ok(body)
                } else {
                    Err(TransportError::RequestFailed {
                        command,
                        message: message.unwrap_or_else(|| "request failed".to_string()),
                    })
                };
                let _ = entry.tx.send(result);
            }
            FramerOutput::Message(ProtocolMessage::Event { event, body, .. }) => {
                let _ = self.events.send(TransportEvent::Event { name: event, body });
            }
            FramerOutput::Message(ProtocolMessage::Request { seq, command, arguments }) => {
                let _ = self.events.send(TransportEvent::ReverseRequest { seq, command, arguments });
            }
            FramerOutput::ParseError { error } => {
                warn!("dropping unparseable frame: {error}");
                let _ = self.events.send(TransportEvent::ParseError { error });
            }
        }
    }

    /// Transitions to closed exactly once: rejects all pending requests,
    /// asks the process watcher to kill the child, emits `Closed`.
    fn mark_closed(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        let entries = {
            let mut pending = lock_or_recover(&self.pending, "mark_closed.pending");
            pending.take()
        };
        if let Some(map) = entries {
            for (_, entry) in map {
                let _ = entry.tx.send(Err(TransportError::Closed));
            }
        }
        if let Some(kill) = lock_or_recover(&self.kill_tx, "mark_closed.kill").take() {
            let _ = kill.send(());
        }
        let _ = self.events.send(TransportEvent::Closed);
    }
}

/// Handle to one framed adapter channel. Cheap to clone; all clones share
/// the same sequence counter, pending map and writer.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl Transport {
    /// Starts a transport over an arbitrary reader/writer pair and returns
    /// the handle plus the event stream.
    ///
    /// The reader is consumed by a background task that runs until EOF,
    /// an I/O error or [`close`](Self::close).
    pub fn start<R, W>(
        reader: R,
        writer: W,
        config: TransportConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            seq: AtomicI64::new(1),
            pending: Mutex::new(Some(HashMap::new())),
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            open: AtomicBool::new(true),
            kill_tx: Mutex::new(None),
            events: events_tx,
            request_timeout: config.request_timeout,
        });

        tokio::spawn(read_loop(reader, Arc::clone(&inner)));

        (Self { inner }, events_rx)
    }

    /// Whether the channel is still usable.
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Sends a request and awaits its response with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`TransportError::RequestFailed`] when the adapter answers
    ///   `success = false`; the adapter's message is carried verbatim.
    /// - [`TransportError::TimedOut`] when no response arrives in time.
    /// - [`TransportError::Closed`] when the channel closes first.
    pub async fn send_request(
        &self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<Option<Value>, TransportError> {
        self.send_request_with_timeout(command, arguments, self.inner.request_timeout).await
    }

    /// Sends a request and awaits its response with an explicit timeout.
    pub async fn send_request_with_timeout(
        &self,
        command: &str,
        arguments: Option<Value>,
        timeout: Duration,
    ) -> Result<Option<Value>, TransportError> {
        let (tx, rx) = oneshot::channel();
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        {
            let mut pending = lock_or_recover(&self.inner.pending, "send_request.pending");
            let Some(map) = pending.as_mut() else {
                return Err(TransportError::Closed);
            };
            map.insert(seq, PendingEntry { command: command.to_string(), tx });
        }

        let message = ProtocolMessage::Request {
            seq,
            command: command.to_string(),
            arguments,
        };
        if let Err(err) = self.write_frame(&message).await {
            let mut pending = lock_or_recover(&self.inner.pending, "send_request.unregister");
            if let Some(map) = pending.as_mut() {
                map.remove(&seq);
            }
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without a value: the pending map was torn down.
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                let mut pending = lock_or_recover(&self.inner.pending, "send_request.timeout");
                if let Some(map) = pending.as_mut() {
                    map.remove(&seq);
                }
                Err(TransportError::TimedOut { command: command.to_string(), seq })
            }
        }
    }

    /// Answers a reverse request from the adapter.
    pub async fn send_response(
        &self,
        request_seq: i64,
        command: &str,
        success: bool,
        body: Option<Value>,
        message: Option<String>,
    ) -> Result<(), TransportError> {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        let response = ProtocolMessage::Response {
            seq,
            request_seq,
            success,
            command: command.to_string(),
            message,
            body,
        };
        self.write_frame(&response).await
    }

    /// Closes the channel. Idempotent: all pending requests are rejected
    /// with [`TransportError::Closed`], the adapter child (if any) is
    /// killed, and the write half is shut down.
    pub async fn close(&self) {
        let was_open = self.is_open();
        self.inner.mark_closed();
        if was_open {
            let mut writer = self.inner.writer.lock().await;
            let _ = writer.shutdown().await;
        }
    }

    pub(crate) fn set_kill_handle(&self, kill: oneshot::Sender<()>) {
        *lock_or_recover(&self.inner.kill_tx, "set_kill_handle") = Some(kill);
    }

    pub(crate) fn events_sender(&self) -> mpsc::UnboundedSender<TransportEvent> {
        self.inner.events.clone()
    }

    async fn write_frame(&self, message: &ProtocolMessage) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let frame = encode_message(message)?;
        let mut writer = self.inner.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

async fn read_loop<R>(mut reader: R, inner: Arc<Inner>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut framer = MessageFramer::new();
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => match framer.push(&buf[..n]) {
                Ok(outputs) => {
                    for output in outputs {
                        inner.dispatch(output);
                    }
                }
                Err(err) => {
                    warn!("framing failure, closing transport: {err}");
                    break;
                }
            },
            Err(err) => {
                debug!("transport read ended: {err}");
                break;
            }
        }
        if !inner.open.load(Ordering::SeqCst) {
            break;
        }
    }
    inner.mark_closed();
}
