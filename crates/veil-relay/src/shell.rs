//! Production runtime shell.
//!
//! Wraps [`RelayDriver`] with real I/O: a TCP listener speaking
//! newline-delimited JSON, one reader/writer task pair per connection, and
//! a single orchestrator task that owns the driver. Connections never touch
//! the registries directly; they funnel events through one channel, which
//! preserves the driver's single-writer invariant.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use veil_proto::ClientMessage;

use crate::driver::{LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent};
use crate::error::RelayError;
use crate::registry::EndpointId;

/// How often the driver's clock ticks when an expiry policy is set.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime configuration for [`Relay`].
#[derive(Debug, Clone)]
pub struct RelayRuntimeConfig {
    /// Address to listen on.
    pub bind_address: String,
    /// Driver configuration.
    pub driver: RelayConfig,
}

/// Events flowing from connection tasks to the orchestrator.
enum ShellEvent {
    Opened { endpoint: EndpointId, writer: mpsc::UnboundedSender<String> },
    Closed { endpoint: EndpointId },
    Message { endpoint: EndpointId, message: ClientMessage },
    Tick { now_ms: u64 },
}

/// The production relay runtime.
pub struct Relay {
    listener: TcpListener,
    config: RelayRuntimeConfig,
}

impl Relay {
    /// Binds the listen socket.
    pub async fn bind(config: RelayRuntimeConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(&config.bind_address).await?;
        Ok(Self { listener, config })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the accept loop and orchestrator until the process exits.
    pub async fn run(self) -> Result<(), RelayError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let driver = RelayDriver::new(self.config.driver.clone());
        tokio::spawn(orchestrate(driver, events_rx));

        if self.config.driver.pending_group_expiry.is_some() {
            tokio::spawn(tick_loop(events_tx.clone()));
        }

        let mut next_endpoint: EndpointId = 0;
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let endpoint = next_endpoint;
            next_endpoint += 1;
            debug!(endpoint, %peer, "accepted connection");
            tokio::spawn(serve_connection(endpoint, stream, events_tx.clone()));
        }
    }
}

/// The single-writer orchestrator: owns the driver and the outbound
/// channel per endpoint, executes every action the driver emits.
async fn orchestrate(mut driver: RelayDriver, mut events: mpsc::UnboundedReceiver<ShellEvent>) {
    let mut writers: HashMap<EndpointId, mpsc::UnboundedSender<String>> = HashMap::new();

    while let Some(event) = events.recv().await {
        let driver_event = match event {
            ShellEvent::Opened { endpoint, writer } => {
                writers.insert(endpoint, writer);
                RelayEvent::EndpointOpened { endpoint }
            }
            ShellEvent::Closed { endpoint } => {
                writers.remove(&endpoint);
                RelayEvent::EndpointClosed { endpoint }
            }
            ShellEvent::Message { endpoint, message } => {
                RelayEvent::MessageReceived { endpoint, message }
            }
            ShellEvent::Tick { now_ms } => RelayEvent::Tick { now_ms },
        };

        for action in driver.handle(driver_event) {
            execute(action, &mut writers);
        }
    }
}

fn execute(action: RelayAction, writers: &mut HashMap<EndpointId, mpsc::UnboundedSender<String>>) {
    match action {
        RelayAction::Send { endpoint, message } => {
            let line = match message.to_json() {
                Ok(line) => line,
                Err(err) => {
                    error!(endpoint, %err, "failed to encode outbound message");
                    return;
                }
            };
            let Some(writer) = writers.get(&endpoint) else {
                debug!(endpoint, "send to closed endpoint, dropping");
                return;
            };
            // A failed send means the writer task exited; the reader's
            // Closed event will clean up shortly.
            if writer.send(line).is_err() {
                debug!(endpoint, "writer gone, dropping message");
            }
        }
        RelayAction::Close { endpoint, reason } => {
            info!(endpoint, %reason, "closing endpoint");
            // Dropping the sender ends the writer task, which closes the
            // socket.
            writers.remove(&endpoint);
        }
        RelayAction::Log { level, message } => match level {
            LogLevel::Debug => debug!("{message}"),
            LogLevel::Info => info!("{message}"),
            LogLevel::Warn => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        },
    }
}

/// Per-connection task: registers the endpoint, pumps inbound lines into
/// the orchestrator, and tears down on EOF or error.
async fn serve_connection(
    endpoint: EndpointId,
    stream: TcpStream,
    events: mpsc::UnboundedSender<ShellEvent>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();

    if events.send(ShellEvent::Opened { endpoint, writer: writer_tx }).is_err() {
        return;
    }

    let writer_task = tokio::spawn(async move {
        while let Some(line) = writer_rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\n").await.is_err() {
                break;
            }
        }
        // Sender dropped or write failed: close our half.
        let _ = write_half.shutdown().await;
    });

    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match ClientMessage::from_json(line) {
                    Ok(message) => {
                        if events.send(ShellEvent::Message { endpoint, message }).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(endpoint, %err, "undecodable line, dropping");
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!(endpoint, %err, "read error");
                break;
            }
        }
    }

    let _ = events.send(ShellEvent::Closed { endpoint });
    writer_task.abort();
}

/// Feeds the driver a monotonic clock for the proposal expiry policy.
async fn tick_loop(events: mpsc::UnboundedSender<ShellEvent>) {
    let start = Instant::now();
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        interval.tick().await;
        let now_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if events.send(ShellEvent::Tick { now_ms }).is_err() {
            return;
        }
    }
}
