//! Connection management
//!
//! Drives the connection state machine, the background poll worker, and
//! event delivery to the collaborator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use super::codec::{self, DeviceReply};
use super::serial::{list_ports, PortInfo};
use super::transport::{LineTransport, LinkChannel};
use super::{DecodeError, SessionError, DEFAULT_BAUD_RATE};
use crate::table::{Entry, EntryTable, TableError};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Opening the port
    Connecting,
    /// Connected, poll worker running
    Connected,
    /// Link failure detected; tearing down
    Lost,
}

/// Why a state transition happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeReason {
    /// Collaborator-initiated transition
    UserRequest,
    /// Port open failed during connect
    ConnectFailed,
    /// The link died under an active session
    LinkLost,
}

/// Notifications delivered to the collaborator
#[derive(Debug, Clone, Serialize)]
pub enum SessionEvent {
    /// Diagnostic line for the session log
    Log(String),
    /// The mirror table changed; carries a full snapshot
    TableChanged(Vec<Entry>),
    /// The connection state machine moved
    StateChanged {
        /// New state
        state: ConnectionState,
        /// What triggered the transition
        reason: ChangeReason,
    },
    /// The available-port list was re-enumerated
    PortsRefreshed(Vec<PortInfo>),
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl SessionConfig {
    /// Config for a port at the default baud rate
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }
}

/// Label function, called with the 1-based position at every table resize
type Labeler = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// State shared between the engine and its poll worker
struct Shared {
    state: Mutex<ConnectionState>,
    transport: Mutex<Option<LineTransport>>,
    table: Mutex<EntryTable>,
    labeler: Mutex<Labeler>,
}

/// Poison-tolerant lock: a panicked holder must not wedge the session.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Protocol/connection engine for one device session.
///
/// Owns the connection state machine and the background poll worker.
/// Collaborators drive it through the methods here and observe results
/// through the [`SessionEvent`] channel handed out by [`SessionEngine::new`].
pub struct SessionEngine {
    shared: Arc<Shared>,
    events: Sender<SessionEvent>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SessionEngine {
    /// Create an engine and the event stream its collaborator consumes
    pub fn new() -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel();
        let engine = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                transport: Mutex::new(None),
                table: Mutex::new(EntryTable::new()),
                labeler: Mutex::new(Arc::new(|i: usize| i.to_string())),
            }),
            events: tx,
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
        };
        (engine, rx)
    }

    /// Install the label function used at every table resize.
    ///
    /// The default labels each entry with its decimal position.
    pub fn set_labeler(&self, labeler: impl Fn(usize) -> String + Send + Sync + 'static) {
        *lock(&self.shared.labeler) = Arc::new(labeler);
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }

    /// Owned copy of the current table for rendering
    pub fn snapshot(&self) -> Vec<Entry> {
        lock(&self.shared.table).snapshot()
    }

    /// List available serial ports
    pub fn list_ports() -> Vec<PortInfo> {
        list_ports()
    }

    /// Open the configured port and start a session.
    ///
    /// On success the poll worker is running and a discovery request has
    /// been sent; replies arrive as events. On failure the engine is back
    /// in `Disconnected` and remains usable.
    pub fn connect(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        self.begin_connecting()?;
        tracing::info!(port = %config.port_name, baud = config.baud_rate, "connecting");

        match LineTransport::open(&config.port_name, config.baud_rate) {
            Ok(transport) => {
                let label = format!("{} at {} baud", config.port_name, config.baud_rate);
                self.start_session(transport, &label)
            }
            Err(e) => {
                *lock(&self.shared.state) = ConnectionState::Disconnected;
                self.emit(SessionEvent::Log(format!("Connection failed: {}", e)));
                self.emit(SessionEvent::StateChanged {
                    state: ConnectionState::Disconnected,
                    reason: ChangeReason::ConnectFailed,
                });
                Err(SessionError::Link(e))
            }
        }
    }

    /// Start a session over an already-open channel.
    ///
    /// Seam for non-serial links and for tests; [`SessionEngine::connect`]
    /// funnels through the same path.
    pub fn connect_channel(
        &mut self,
        chan: Box<dyn LinkChannel>,
        label: &str,
    ) -> Result<(), SessionError> {
        self.begin_connecting()?;
        self.start_session(LineTransport::from_channel(chan), label)
    }

    /// Tear down the session at the collaborator's request
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        {
            let state = lock(&self.shared.state);
            if !matches!(*state, ConnectionState::Connected | ConnectionState::Lost) {
                return Err(SessionError::NotConnected);
            }
        }

        self.stop_worker();

        {
            let mut state = lock(&self.shared.state);
            if *state == ConnectionState::Disconnected {
                // The worker hit a link failure while we were joining it
                // and already tore the session down.
                return Ok(());
            }
            *state = ConnectionState::Disconnected;
        }
        *lock(&self.shared.transport) = None;
        lock(&self.shared.table).clear();
        self.emit(SessionEvent::TableChanged(Vec::new()));
        self.emit(SessionEvent::Log("Disconnected".to_string()));
        self.emit(SessionEvent::StateChanged {
            state: ConnectionState::Disconnected,
            reason: ChangeReason::UserRequest,
        });
        Ok(())
    }

    /// Refresh: re-send discovery when connected, re-enumerate ports when
    /// idle. The idle behavior is what "refresh" means to a user looking
    /// at an empty port list.
    pub fn refresh(&mut self) -> Result<(), SessionError> {
        match self.state() {
            ConnectionState::Connected => self.send_command(codec::encode_discovery_request()),
            _ => {
                self.refresh_ports();
                Ok(())
            }
        }
    }

    /// Ask the device for its table size only
    pub fn request_count(&mut self) -> Result<(), SessionError> {
        self.send_command(codec::encode_count_request())
    }

    /// Write `text` to slot `index` (1-based)
    pub fn send_entry(&mut self, index: usize, text: &str) -> Result<(), SessionError> {
        self.send_command(&codec::encode_write(index, text))
    }

    /// Send a free-form command line
    pub fn send_custom(&mut self, text: &str) -> Result<(), SessionError> {
        self.send_command(codec::encode_raw(text))
    }

    fn begin_connecting(&mut self) -> Result<(), SessionError> {
        {
            let mut state = lock(&self.shared.state);
            if *state != ConnectionState::Disconnected {
                return Err(SessionError::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
        }
        self.emit(SessionEvent::StateChanged {
            state: ConnectionState::Connecting,
            reason: ChangeReason::UserRequest,
        });
        Ok(())
    }

    fn start_session(
        &mut self,
        transport: LineTransport,
        label: &str,
    ) -> Result<(), SessionError> {
        *lock(&self.shared.transport) = Some(transport);
        *lock(&self.shared.state) = ConnectionState::Connected;
        self.emit(SessionEvent::Log(format!("Connected to {}", label)));
        self.emit(SessionEvent::StateChanged {
            state: ConnectionState::Connected,
            reason: ChangeReason::UserRequest,
        });

        // Reap the previous session's worker, then arm a fresh run
        self.stop_worker();
        self.cancel.store(false, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();
        let cancel = Arc::clone(&self.cancel);
        self.worker = Some(std::thread::spawn(move || {
            poll_loop(&shared, &events, &cancel);
        }));

        // Discovery kicks off the initial table dump
        self.send_command(codec::encode_discovery_request())
    }

    fn send_command(&mut self, text: &str) -> Result<(), SessionError> {
        let result = {
            let mut guard = lock(&self.shared.transport);
            let transport = guard.as_mut().ok_or(SessionError::NotConnected)?;
            transport.write_line(text)
        };

        match result {
            Ok(()) => {
                self.emit(SessionEvent::Log(format!("Sent: {}", text)));
                Ok(())
            }
            Err(e) => {
                tracing::warn!("write failed: {}", e);
                self.emit(SessionEvent::Log(format!("Write failed: {}", e)));
                // A failed send means the link is gone; run the same path
                // the poll worker takes.
                self.stop_worker();
                handle_link_loss(&self.shared, &self.events);
                Err(SessionError::Link(e))
            }
        }
    }

    fn refresh_ports(&self) {
        let ports = list_ports();
        self.emit(SessionEvent::Log(format!(
            "Serial port list refreshed ({} found)",
            ports.len()
        )));
        self.emit(SessionEvent::PortsRefreshed(ports));
    }

    fn stop_worker(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    fn emit(&self, event: SessionEvent) {
        // A collaborator that dropped its receiver forfeits events; that
        // must not take the session down.
        let _ = self.events.send(event);
    }
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// Background poll worker: read lines, apply replies, probe liveness.
///
/// Runs only while the session is `Connected`; any transport error ends
/// the loop through the link-loss path. Cancellation is observed within
/// one read timeout.
fn poll_loop(shared: &Shared, events: &Sender<SessionEvent>, cancel: &AtomicBool) {
    tracing::debug!("poll worker started");
    loop {
        if cancel.load(Ordering::Relaxed) {
            tracing::debug!("poll worker cancelled");
            return;
        }

        let read = {
            let mut guard = lock(&shared.transport);
            match guard.as_mut() {
                Some(transport) => transport.try_read_line(),
                // Transport already torn down under us
                None => return,
            }
        };

        match read {
            Ok(Some(line)) => {
                let _ = events.send(SessionEvent::Log(format!("Received: {}", line)));
                apply_line(shared, events, &line);
            }
            Ok(None) => {
                // Nothing pending; probe so a severed link is noticed
                // even when the device is silent.
                let probe = {
                    let mut guard = lock(&shared.transport);
                    match guard.as_mut() {
                        Some(transport) => transport.probe(),
                        None => return,
                    }
                };
                if let Err(e) = probe {
                    let _ = events.send(SessionEvent::Log(format!("Connection lost: {}", e)));
                    handle_link_loss(shared, events);
                    return;
                }
            }
            Err(e) => {
                let _ = events.send(SessionEvent::Log(format!("Connection lost: {}", e)));
                handle_link_loss(shared, events);
                return;
            }
        }
    }
}

/// Decode one received line and apply it to the mirror table.
///
/// Decode and range failures are diagnostics, never fatal: the table
/// keeps its last-known-good contents and the session stays connected.
fn apply_line(shared: &Shared, events: &Sender<SessionEvent>, line: &str) {
    match codec::decode_line(line) {
        Ok(DeviceReply::SizeAnnounced(n)) => {
            let labeler = lock(&shared.labeler).clone();
            let snapshot = {
                let mut table = lock(&shared.table);
                table.resize(n, &*labeler);
                table.snapshot()
            };
            let _ = events.send(SessionEvent::Log(format!("Created {} entries", n)));
            let _ = events.send(SessionEvent::TableChanged(snapshot));
        }
        Ok(DeviceReply::EntryRead { position, value }) => {
            let applied = {
                let mut table = lock(&shared.table);
                table
                    .set_value(position, value)
                    .map(|_| table.snapshot())
            };
            match applied {
                Ok(snapshot) => {
                    let _ = events.send(SessionEvent::TableChanged(snapshot));
                }
                Err(TableError::OutOfRange { position, size }) => {
                    let err = DecodeError::OutOfRange { position, size };
                    tracing::warn!("{}", err);
                    let _ = events.send(SessionEvent::Log(format!("Decode error: {}", err)));
                }
            }
        }
        // Free-form diagnostics were already logged verbatim on receive
        Ok(DeviceReply::Unrecognized(_)) => {}
        Err(e) => {
            tracing::warn!("{}", e);
            let _ = events.send(SessionEvent::Log(format!("Decode error: {}", e)));
        }
    }
}

/// Tear down after a detected link failure.
///
/// Guarded so it runs at most once per session even when the poll worker
/// and a foreground send detect the same failure.
fn handle_link_loss(shared: &Shared, events: &Sender<SessionEvent>) {
    {
        let mut state = lock(&shared.state);
        if *state != ConnectionState::Connected {
            return;
        }
        *state = ConnectionState::Lost;
    }
    tracing::warn!("link lost, tearing down session");
    let _ = events.send(SessionEvent::StateChanged {
        state: ConnectionState::Lost,
        reason: ChangeReason::LinkLost,
    });

    *lock(&shared.transport) = None;
    lock(&shared.table).clear();
    let _ = events.send(SessionEvent::TableChanged(Vec::new()));

    *lock(&shared.state) = ConnectionState::Disconnected;
    let _ = events.send(SessionEvent::StateChanged {
        state: ConnectionState::Disconnected,
        reason: ChangeReason::LinkLost,
    });

    // The stale port may be gone from the system; hand the collaborator
    // a fresh list to offer.
    let _ = events.send(SessionEvent::PortsRefreshed(list_ports()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_engine_is_disconnected() {
        let (engine, _events) = SessionEngine::new();
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert!(engine.snapshot().is_empty());
    }

    #[test]
    fn test_disconnect_when_idle_is_an_error() {
        let (mut engine, _events) = SessionEngine::new();
        assert!(matches!(
            engine.disconnect(),
            Err(SessionError::NotConnected)
        ));
    }

    #[test]
    fn test_send_when_idle_is_an_error() {
        let (mut engine, _events) = SessionEngine::new();
        assert!(matches!(
            engine.send_entry(1, "x"),
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            engine.send_custom("h"),
            Err(SessionError::NotConnected)
        ));
    }

    #[test]
    fn test_refresh_while_disconnected_reenumerates_ports() {
        let (mut engine, events) = SessionEngine::new();
        engine.refresh().unwrap();

        let mut saw_ports = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::PortsRefreshed(_)) {
                saw_ports = true;
            }
            // No wire command can have been sent: there is no transport
            assert!(!matches!(event, SessionEvent::StateChanged { .. }));
        }
        assert!(saw_ports);
    }

    #[test]
    fn test_connect_failure_returns_to_disconnected() {
        let (mut engine, events) = SessionEngine::new();
        let err = engine.connect(SessionConfig::for_port("/dev/does-not-exist-9999"));
        assert!(err.is_err());
        assert_eq!(engine.state(), ConnectionState::Disconnected);

        let states: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|e| match e {
                SessionEvent::StateChanged { state, reason } => Some((state, reason)),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                (ConnectionState::Connecting, ChangeReason::UserRequest),
                (ConnectionState::Disconnected, ChangeReason::ConnectFailed),
            ]
        );
    }
}
