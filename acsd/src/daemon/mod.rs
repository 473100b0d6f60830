//! Daemon front end.
//!
//! # Architecture
//!
//! ```text
//! ┌────────┐ ┌────────┐ ┌────────┐
//! │client 1│ │client 2│ │client 3│   TCP connections
//! └───┬────┘ └───┬────┘ └───┬────┘
//!     │ reader / writer tasks │      (tokio, one pair per connection)
//!     └──────────┬────────────┘
//!         inbound events
//!                │
//!        ┌───────┴───────┐
//!        │ control thread │  dispatcher + registry, tick/sweep cadence
//!        └───┬───────┬───┘
//!   mount jobs│       │registry channel
//!     ┌──────┴─┐   ┌─┴───────────┐
//!     │executors│   │vendor library│
//!     └─────────┘   └─────────────┘
//! ```
//!
//! Reader tasks decode frames and feed a single control thread through a
//! channel; the control thread owns the dispatcher, the registry and its
//! library channel, and interleaves envelope handling with the periodic
//! tick/sweep pass. Blocking mounts run on dedicated executor threads,
//! one concurrent mount each, with a library channel of their own.
//! Replies travel back through per-connection writer channels; requests
//! hold only the opaque client token, never a socket.

pub mod dispatcher;
pub mod registry;
pub mod request;

pub use dispatcher::{MountJob, RequestDispatcher};
pub use registry::PendingRequestRegistry;
pub use request::{AsyncRequest, RequestState};

use crate::config::DaemonConfig;
use crate::library::channel::LibraryChannel;
use crate::library::{ops, LibraryApi};
use acs_proto::{read_frame_async, AcsReply, Frame};
use anyhow::{bail, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Capacity of one connection's outbound reply queue.
const REPLY_QUEUE_SIZE: usize = 64;

/// Capacity of the mount executor job queue.
const MOUNT_QUEUE_SIZE: usize = 64;

/// Opaque routing token identifying the connection a request came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientToken(pub u64);

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client {}", self.0)
    }
}

/// Routing table from client tokens to per-connection writer queues.
#[derive(Clone, Default)]
pub struct ConnTable {
    inner: Arc<DashMap<ClientToken, mpsc::Sender<Vec<u8>>>>,
}

impl ConnTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: ClientToken, tx: mpsc::Sender<Vec<u8>>) {
        self.inner.insert(token, tx);
    }

    pub fn remove(&self, token: ClientToken) {
        self.inner.remove(&token);
    }

    /// Queue an encoded frame for delivery to a client.
    pub fn send(&self, token: ClientToken, frame: &Frame) -> Result<()> {
        let bytes = frame.encode().context("encoding reply frame")?;
        let Some(tx) = self.inner.get(&token) else {
            bail!("{token} is not connected");
        };
        tx.try_send(bytes)
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => {
                    anyhow::anyhow!("reply queue for {token} is full")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    anyhow::anyhow!("{token} disconnected")
                }
            })
    }
}

/// Inbound events feeding the control thread.
enum Event {
    Frame { client: ClientToken, frame: Frame },
    Shutdown,
}

/// Factory minting one vendor library handle per channel: the registry
/// gets one, each mount executor gets its own.
pub type LibraryFactory = dyn Fn() -> Box<dyn LibraryApi> + Send + Sync;

/// A bound daemon, ready to serve.
pub struct Daemon {
    listener: TcpListener,
    conns: ConnTable,
    event_tx: Sender<Event>,
    control: std::thread::JoinHandle<()>,
    executors: Vec<std::thread::JoinHandle<()>>,
}

impl Daemon {
    /// Bind the listening socket and start the control thread and mount
    /// executors.
    pub async fn bind(config: DaemonConfig, factory: Arc<LibraryFactory>) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .await
            .with_context(|| format!("binding port {}", config.port))?;

        let conns = ConnTable::new();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (mount_tx, mount_rx) = crossbeam_channel::bounded::<MountJob>(MOUNT_QUEUE_SIZE);

        let executors = (0..config.mount_workers.max(1))
            .map(|i| {
                let rx = mount_rx.clone();
                let conns = conns.clone();
                let channel = LibraryChannel::new(factory());
                let config = config.clone();
                std::thread::Builder::new()
                    .name(format!("acsd-mount-{i}"))
                    .spawn(move || mount_executor_loop(rx, conns, channel, config))
                    .expect("failed to spawn mount executor thread")
            })
            .collect();

        let registry = PendingRequestRegistry::new(LibraryChannel::new(factory()), &config);
        let dispatcher = RequestDispatcher::new(registry, mount_tx, conns.clone());
        let tick_interval = config.tick_interval;
        let control = std::thread::Builder::new()
            .name("acsd-control".to_string())
            .spawn(move || control_loop(dispatcher, event_rx, tick_interval))
            .expect("failed to spawn control thread");

        Ok(Self {
            listener,
            conns,
            event_tx,
            control,
            executors,
        })
    }

    /// The bound listening address (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until ctrl-c, then shut the control thread and
    /// executors down.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.listener.local_addr()?, "listening");
        let mut next_client = 1u64;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.context("accepting connection")?;
                    let token = ClientToken(next_client);
                    next_client += 1;
                    info!(%token, %peer, "connected");
                    spawn_connection(stream, token, self.conns.clone(), self.event_tx.clone());
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        let _ = self.event_tx.send(Event::Shutdown);
        let _ = self.control.join();
        for executor in self.executors {
            let _ = executor.join();
        }
        Ok(())
    }
}

fn spawn_connection(
    stream: TcpStream,
    token: ClientToken,
    conns: ConnTable,
    events: Sender<Event>,
) {
    let _ = stream.set_nodelay(true);
    let (mut read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::channel::<Vec<u8>>(REPLY_QUEUE_SIZE);
    conns.register(token, tx);

    tokio::spawn(connection_writer(write_half, rx));

    tokio::spawn(async move {
        loop {
            let frame = match read_frame_async(&mut read_half).await {
                Ok(frame) => frame,
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(err) => {
                    warn!(%token, error = %err, "dropping connection");
                    break;
                }
            };
            if events.send(Event::Frame { client: token, frame }).is_err() {
                break; // control thread gone
            }
        }
        conns.remove(token);
        info!(%token, "disconnected");
    });
}

async fn connection_writer(
    write_half: tokio::net::tcp::OwnedWriteHalf,
    mut rx: mpsc::Receiver<Vec<u8>>,
) {
    let mut writer = BufWriter::new(write_half);
    while let Some(bytes) = rx.recv().await {
        if writer.write_all(&bytes).await.is_err() {
            break;
        }
        // Flush when nothing else is queued; otherwise batch.
        if rx.is_empty() && writer.flush().await.is_err() {
            break;
        }
    }
    let _ = writer.flush().await;
}

/// The single control loop: envelopes in, tick/sweep at a bounded
/// cadence. Admission and registry advancement never interleave because
/// both happen here.
fn control_loop(
    mut dispatcher: RequestDispatcher,
    events: Receiver<Event>,
    tick_interval: Duration,
) {
    debug!("control loop started");
    let mut last_pump = Instant::now();

    loop {
        let wait = tick_interval.saturating_sub(last_pump.elapsed());
        match events.recv_timeout(wait) {
            Ok(Event::Frame { client, frame }) => dispatcher.handle(client, frame),
            Ok(Event::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if last_pump.elapsed() >= tick_interval {
            dispatcher.pump();
            last_pump = Instant::now();
        }
    }
    debug!("control loop exiting");
}

/// One blocking mount executor: runs mounts to completion one at a time
/// and delivers the reply itself.
fn mount_executor_loop(
    rx: Receiver<MountJob>,
    conns: ConnTable,
    mut channel: LibraryChannel,
    config: DaemonConfig,
) {
    debug!("mount executor ready");
    while let Ok(job) = rx.recv() {
        let result = ops::mount_tape(
            &mut channel,
            &job.vid,
            job.drive,
            job.read_only,
            config.query_interval,
            config.command_timeout,
        );
        let reply = match result {
            Ok(()) => AcsReply::ok(),
            Err(err) => AcsReply::exception(err.code(), err.to_string()),
        };

        match reply.to_frame() {
            Ok(frame) => {
                if let Err(err) = conns.send(job.client, &frame) {
                    warn!(client = %job.client, error = %err, "failed to deliver mount reply");
                }
            }
            Err(err) => warn!(client = %job.client, error = %err, "failed to encode mount reply"),
        }
    }
    debug!("mount executor exiting");
}
