//! Query daemon: a local socket server answering read-only queries over the arrays of a workspace.
//!
//! The daemon goes through the states of [`DaemonState`]:
//!
//! * `Init`: [`QueryDaemon::new`] opens every configured array that exists.
//!   Missing arrays stay unavailable.
//! * `Listening`: [`QueryDaemon::bind`] binds the socket, and [`QueryDaemon::run`] accepts connections.
//!   Each connection is handled by its own worker thread with one request and one response.
//! * `Draining`: after [`ShutdownHandle::shutdown`], the daemon stops accepting connections and waits for the
//!   workers to finish.
//! * `Exited`: the arrays are closed and the socket is removed.
//!
//! See [`protocol`] for the wire format and [`QueryService`] for the operations.
//! A worker waits at most [`DaemonConfig::client_timeout`] for the client to send its request or to accept the
//! response, so an idle client cannot keep the daemon from draining.
//! There is no timeout on executing a query; a slow query occupies its worker until it completes.

use crate::workspace::{ArrayLayout, Workspace};
use crate::{Error, Result};

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub mod cache;
pub mod operations;
pub mod protocol;

pub use cache::StatsCache;
pub use operations::QueryService;
pub use protocol::{Operation, Request};

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// Daemon configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Workspace containing the arrays.
    pub workspace: PathBuf,
    /// Path of the Unix socket.
    pub socket: PathBuf,
    /// How long cached statistics remain valid.
    pub cache_ttl: Duration,
    /// Largest population array for exact statistics.
    pub population_estimate_limit: usize,
    /// How long a worker waits on a blocked read or write of a client connection.
    ///
    /// Zero disables the timeout.
    pub client_timeout: Duration,
    /// Array locations relative to the workspace.
    pub arrays: ArrayLayout,
}

impl DaemonConfig {
    /// Default cache TTL.
    pub const CACHE_TTL: Duration = Duration::from_secs(300);

    /// Default population estimate limit.
    pub const POPULATION_ESTIMATE_LIMIT: usize = 5_000_000;

    /// Default client timeout.
    pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a configuration with default parameters.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(workspace: P, socket: Q) -> Self {
        DaemonConfig {
            workspace: workspace.as_ref().to_path_buf(),
            socket: socket.as_ref().to_path_buf(),
            cache_ttl: Self::CACHE_TTL,
            population_estimate_limit: Self::POPULATION_ESTIMATE_LIMIT,
            client_timeout: Self::CLIENT_TIMEOUT,
            arrays: ArrayLayout::default(),
        }
    }
}

/// Lifecycle state of the daemon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DaemonState {
    /// Arrays opened; not listening yet.
    Init,
    /// Accepting connections.
    Listening,
    /// No longer accepting connections; waiting for workers.
    Draining,
    /// Shut down.
    Exited,
}

impl DaemonState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DaemonState::Init,
            1 => DaemonState::Listening,
            2 => DaemonState::Draining,
            _ => DaemonState::Exited,
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    shutdown: AtomicBool,
    socket: PathBuf,
}

impl Shared {
    fn state(&self) -> DaemonState {
        DaemonState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: DaemonState) {
        self.state.store(state as u8, Ordering::SeqCst);
        log::debug!("Daemon state: {:?}", state);
    }
}

/// A handle for shutting down a running daemon from another thread.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    shared: Arc<Shared>,
}

impl ShutdownHandle {
    /// Asks the daemon to drain and exit.
    ///
    /// Calling this more than once is harmless.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Shutting down");
        // Wake up the accept loop.
        if self.shared.state() == DaemonState::Listening {
            let _ = UnixStream::connect(&self.shared.socket);
        }
    }

    /// Returns `true` if shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Returns the current state of the daemon.
    pub fn state(&self) -> DaemonState {
        self.shared.state()
    }
}

//-----------------------------------------------------------------------------

/// The query daemon.
///
/// # Examples
///
/// ```no_run
/// use genome_base::daemon::{DaemonConfig, QueryDaemon};
/// use std::thread;
///
/// let config = DaemonConfig::new("/data/genomics", "/tmp/genome-base.sock");
/// let mut daemon = QueryDaemon::new(config);
/// daemon.bind().unwrap();
/// let handle = daemon.shutdown_handle();
/// let server = thread::spawn(move || daemon.run());
/// // ...
/// handle.shutdown();
/// server.join().unwrap().unwrap();
/// ```
#[derive(Debug)]
pub struct QueryDaemon {
    config: DaemonConfig,
    service: Arc<QueryService>,
    shared: Arc<Shared>,
    listener: Option<UnixListener>,
    workers: Vec<JoinHandle<()>>,
}

impl QueryDaemon {
    /// Creates a daemon and opens the arrays.
    pub fn new(config: DaemonConfig) -> Self {
        let workspace = Workspace::with_layout(&config.workspace, config.arrays.clone());
        let service = QueryService::open(&workspace, config.cache_ttl, config.population_estimate_limit);
        let shared = Shared {
            state: AtomicU8::new(DaemonState::Init as u8),
            shutdown: AtomicBool::new(false),
            socket: config.socket.clone(),
        };
        QueryDaemon {
            config,
            service: Arc::new(service),
            shared: Arc::new(shared),
            listener: None,
            workers: Vec::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Returns the query service.
    pub fn service(&self) -> &QueryService {
        &self.service
    }

    /// Returns the current state.
    pub fn state(&self) -> DaemonState {
        self.shared.state()
    }

    /// Returns a handle for shutting down the daemon.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { shared: Arc::clone(&self.shared) }
    }

    /// Binds the socket, replacing a stale socket file.
    ///
    /// Does nothing if the socket is already bound.
    ///
    /// # Errors
    ///
    /// Passes through I/O errors.
    pub fn bind(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }
        if self.state() != DaemonState::Init {
            return Err(Error::Protocol(String::from("The daemon has already been shut down")));
        }
        let socket = &self.config.socket;
        if socket.exists() {
            log::warn!("Removing stale socket {}", socket.display());
            fs::remove_file(socket)?;
        }
        let listener = UnixListener::bind(socket)?;
        self.listener = Some(listener);
        self.shared.set_state(DaemonState::Listening);
        log::info!("Listening on {}", socket.display());
        Ok(())
    }

    /// Accepts connections until shutdown, then drains.
    ///
    /// Binds the socket first if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn run(&mut self) -> Result<()> {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            self.drain();
            return Ok(());
        }
        self.bind()?;
        // Shutdown may have been requested before the socket was bound.
        if !self.shared.shutdown.load(Ordering::SeqCst) {
            if let Some(listener) = self.listener.take() {
                self.accept_loop(&listener);
            }
        }
        self.drain();
        Ok(())
    }

    fn accept_loop(&mut self, listener: &UnixListener) {
        for stream in listener.incoming() {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let timeout = Some(self.config.client_timeout).filter(|x| !x.is_zero());
                    if let Err(err) = stream.set_read_timeout(timeout).and_then(|_| stream.set_write_timeout(timeout)) {
                        log::warn!("Failed to set the client timeout: {}", err);
                    }
                    let service = Arc::clone(&self.service);
                    let worker = thread::spawn(move || handle_connection(&service, stream));
                    self.workers.push(worker);
                },
                Err(err) => log::warn!("Failed to accept a connection: {}", err),
            }
            self.join_workers(false);
        }
    }

    // Joins finished workers, or all workers if `wait` is set.
    fn join_workers(&mut self, wait: bool) {
        let mut running = Vec::new();
        for worker in self.workers.drain(..) {
            if !wait && !worker.is_finished() {
                running.push(worker);
            } else if worker.join().is_err() {
                log::error!("A worker thread panicked");
            }
        }
        self.workers = running;
    }

    fn drain(&mut self) {
        if self.state() == DaemonState::Exited {
            return;
        }
        self.shared.set_state(DaemonState::Draining);
        self.listener = None;
        self.join_workers(true);
        self.service.close();
        self.remove_socket();
        self.shared.set_state(DaemonState::Exited);
        log::info!("Daemon exited");
    }

    fn remove_socket(&self) {
        match fs::remove_file(&self.config.socket) {
            Ok(()) => log::info!("Removed socket {}", self.config.socket.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {},
            Err(err) => log::warn!("Cannot remove socket {}: {}", self.config.socket.display(), err),
        }
    }
}

impl Drop for QueryDaemon {
    fn drop(&mut self) {
        if self.listener.is_some() {
            self.drain();
        }
    }
}

fn handle_connection(service: &QueryService, mut stream: UnixStream) {
    let response = match protocol::read_request(&mut stream) {
        Ok(request) => service.execute(&request),
        Err(err) => {
            log::warn!("Failed to read a request: {}", err);
            protocol::error_response(&err)
        },
    };
    if let Err(err) = protocol::write_response(&mut stream, &response) {
        log::warn!("Failed to send a response: {}", err);
    }
}

//-----------------------------------------------------------------------------
