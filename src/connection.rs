//! # Connection Management Module
//!
//! Owns the websocket to the acquisition device: connect, disconnect,
//! outbound commands, and the queue of inbound socket activity.
//!
//! ## Key Components
//! - `ConnectionManager`: the single device link of the process
//! - `DeviceConnection`: endpoint, state and last error, readable by the UI
//! - `ConnectionObservers`: state, error and data slots for subscribers
//! - `CommandLink`: the command-sending seam the recorder talks to
//!
//! ## Tasks
//! The socket halves live in two spawned tasks that only forward: the reader
//! pushes inbound text into the manager's event queue, the writer drains the
//! outbound command queue. All state changes happen in
//! [`ConnectionManager::next_event`] on the caller's task. Each socket gets a
//! generation number so events from a torn-down socket are discarded.
//!
//! No automatic reconnect: a failed or dropped link goes to `Disconnected`
//! and stays there until the user connects again.

use crate::error::ConnectionError;
use crate::observer::EventSlot;
use crate::protocol::Command;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Something the recorder can send device commands through
pub trait CommandLink {
    fn is_connected(&self) -> bool;

    /// Queue `command` for the device. Must not panic when disconnected.
    fn send_command(&mut self, command: Command) -> Result<(), ConnectionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Read-only view of the device link
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceConnection {
    endpoint: Option<String>,
    state: ConnectionState,
    last_error: Option<String>,
}

impl DeviceConnection {
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// What the session loop receives from the link
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// One inbound text message, to be parsed into frames
    Data(String),
    /// The socket closed or failed; the link is now `Disconnected`
    Dropped(ConnectionError),
}

#[derive(Default)]
pub struct ConnectionObservers {
    pub state: EventSlot<ConnectionState>,
    pub error: EventSlot<String>,
    pub data: EventSlot<String>,
}

#[derive(Debug)]
enum SocketEvent {
    Text(String),
    Closed(Option<String>),
    Failed(String),
}

pub struct ConnectionManager {
    link: DeviceConnection,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    events_tx: mpsc::UnboundedSender<(u64, SocketEvent)>,
    events_rx: mpsc::UnboundedReceiver<(u64, SocketEvent)>,
    reader: Option<JoinHandle<()>>,
    observers: ConnectionObservers,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        ConnectionManager {
            link: DeviceConnection::default(),
            generation: 0,
            outbound: None,
            events_tx,
            events_rx,
            reader: None,
            observers: ConnectionObservers::default(),
        }
    }

    pub fn link(&self) -> &DeviceConnection {
        &self.link
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state
    }

    pub fn observers(&mut self) -> &mut ConnectionObservers {
        &mut self.observers
    }

    /// Open a websocket to `endpoint`, replacing any current link.
    pub async fn connect(&mut self, endpoint: &str) -> Result<(), ConnectionError> {
        self.teardown();
        self.link.endpoint = Some(endpoint.to_string());
        self.set_state(ConnectionState::Connecting);
        log::info!("Connecting to device at {}", endpoint);

        let stream = match connect_async(endpoint).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                let error = ConnectionError::Connect {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                };
                log::error!("{}", error);
                self.fail(&error);
                return Err(error);
            }
        };

        let generation = self.generation;
        let (mut write, mut read) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

        let events = self.events_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => SocketEvent::Text(text.as_str().to_owned()),
                    Ok(Message::Close(frame)) => {
                        SocketEvent::Closed(frame.map(|f| f.reason.as_str().to_owned()))
                    }
                    Ok(Message::Binary(data)) => {
                        log::debug!("Ignoring {} byte binary message", data.len());
                        continue;
                    }
                    Ok(_) => continue,
                    Err(e) => SocketEvent::Failed(e.to_string()),
                };
                let last = !matches!(event, SocketEvent::Text(_));
                if events.send((generation, event)).is_err() || last {
                    return;
                }
            }
            let _ = events.send((generation, SocketEvent::Closed(None)));
        });

        // Detached: it ends when the outbound queue is dropped, closing the socket
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(line) = outbound_rx.recv().await {
                if let Err(e) = write.send(Message::text(line)).await {
                    let _ = events.send((generation, SocketEvent::Failed(e.to_string())));
                    return;
                }
            }
            let _ = write.close().await;
        });

        self.reader = Some(reader);
        self.outbound = Some(outbound_tx);
        self.link.last_error = None;
        self.set_state(ConnectionState::Connected);
        log::info!("Connected to device at {}", endpoint);
        Ok(())
    }

    /// Close the link. Safe to call when already disconnected.
    pub fn disconnect(&mut self) {
        if self.outbound.is_some() {
            log::info!("Disconnecting from device");
        }
        self.teardown();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Wait for the next inbound message or link failure.
    ///
    /// Cancel-safe, so it can sit in a `tokio::select!`. Pends forever while
    /// no socket is open.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        loop {
            let Some((generation, event)) = self.events_rx.recv().await else {
                return std::future::pending().await;
            };
            if generation != self.generation || self.outbound.is_none() {
                log::trace!("Discarding event from a closed socket: {:?}", event);
                continue;
            }

            let error = match event {
                SocketEvent::Text(text) => {
                    log::trace!("Received {} bytes", text.len());
                    self.observers.data.publish(text.clone());
                    return ConnectionEvent::Data(text);
                }
                SocketEvent::Closed(reason) => ConnectionError::Dropped(
                    reason
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by device".to_string()),
                ),
                SocketEvent::Failed(reason) => ConnectionError::Dropped(reason),
            };
            log::error!("{}", error);
            self.teardown();
            self.fail(&error);
            return ConnectionEvent::Dropped(error);
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.link.state = state;
        self.observers.state.publish(state);
    }

    fn fail(&mut self, error: &ConnectionError) {
        self.link.last_error = Some(error.to_string());
        self.observers.error.publish(error.to_string());
        self.set_state(ConnectionState::Disconnected);
    }

    /// Drop the socket tasks and invalidate their queued events
    fn teardown(&mut self) {
        self.generation += 1;
        self.outbound = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl CommandLink for ConnectionManager {
    fn is_connected(&self) -> bool {
        self.link.state == ConnectionState::Connected && self.outbound.is_some()
    }

    fn send_command(&mut self, command: Command) -> Result<(), ConnectionError> {
        let result = match (&self.outbound, self.link.state) {
            (Some(outbound), ConnectionState::Connected) => outbound
                .send(command.to_string())
                .map_err(|e| ConnectionError::Send(e.to_string())),
            _ => Err(ConnectionError::NotConnected),
        };

        match &result {
            Ok(()) => log::debug!("Sent {}", command),
            Err(e) => {
                log::warn!("Could not send {}: {}", command, e);
                self.link.last_error = Some(e.to_string());
                self.observers.error.publish(e.to_string());
            }
        }
        result
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
