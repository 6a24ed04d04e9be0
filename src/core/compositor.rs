//! Wayland display, listening socket and protocol globals.
//!
//! The `Compositor` owns the connection side: it accepts clients, dispatches
//! their requests into `CompositorState` and flushes the events the state
//! produced. Frame scheduling lives in `core::runtime`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use wayland_server::backend::{ClientData, ClientId, DisconnectReason, GlobalId};
use wayland_server::{Display, DisplayHandle, ListeningSocket};

use crate::config::CompositorConfig;
use crate::core::errors::CoreError;
use crate::core::output::OutputId;
use crate::core::state::CompositorState;
use crate::core::wayland;

// ============================================================================
// Client Data
// ============================================================================

/// Per-client data stored with each Wayland connection
#[derive(Debug)]
pub struct ClientState {
    /// Sequential number, for logs
    pub id: u32,
    connected: Arc<AtomicUsize>,
}

impl ClientData for ClientState {
    fn initialized(&self, client_id: ClientId) {
        self.connected.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Client {} connected ({:?})", self.id, client_id);
    }

    fn disconnected(&self, client_id: ClientId, reason: DisconnectReason) {
        self.connected.fetch_sub(1, Ordering::Relaxed);
        let reason = match reason {
            DisconnectReason::ConnectionClosed => "connection closed".to_string(),
            DisconnectReason::ProtocolError(err) => format!("protocol error: {}", err),
        };
        tracing::info!("Client {} disconnected: {} ({:?})", self.id, reason, client_id);
    }
}

// ============================================================================
// Main Compositor
// ============================================================================

pub struct Compositor {
    display: Display<CompositorState>,
    socket: ListeningSocket,
    socket_path: PathBuf,
    config: CompositorConfig,
    next_client_id: u32,
    connected: Arc<AtomicUsize>,
    output_globals: HashMap<OutputId, GlobalId>,
    running: bool,
}

impl Compositor {
    /// Bind `config.socket_name` in the runtime directory.
    pub fn new(config: CompositorConfig) -> Result<Self> {
        let runtime_dir = Self::ensure_runtime_dir()?;
        Self::bind_in(&runtime_dir, config)
    }

    /// Bind `config.socket_name` in `runtime_dir`.
    pub fn bind_in(runtime_dir: &Path, config: CompositorConfig) -> Result<Self> {
        let display = Display::new().context("Failed to create Wayland display")?;

        let socket_path = runtime_dir.join(&config.socket_name);
        let socket = ListeningSocket::bind_absolute(socket_path.clone())
            .with_context(|| format!("Failed to bind socket at {}", socket_path.display()))?;
        crate::wlog!(crate::util::logging::COMPOSITOR, "Listening on {}", socket_path.display());

        Ok(Self {
            display,
            socket,
            socket_path,
            config,
            next_client_id: 1,
            connected: Arc::new(AtomicUsize::new(0)),
            output_globals: HashMap::new(),
            running: false,
        })
    }

    /// `$XDG_RUNTIME_DIR`, or a private directory under the temp dir.
    fn ensure_runtime_dir() -> Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(dir) = std::env::var_os("XDG_RUNTIME_DIR") {
            let dir = PathBuf::from(dir);
            if dir.is_dir() {
                return Ok(dir);
            }
            tracing::warn!("XDG_RUNTIME_DIR {} is not a directory", dir.display());
        }

        let uid = rustix::process::getuid().as_raw();
        let dir = std::env::temp_dir().join(format!("cadence-{}", uid));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create runtime directory {}", dir.display()))?;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to restrict runtime directory {}", dir.display()))?;
        Ok(dir)
    }

    pub fn display_handle(&self) -> DisplayHandle {
        self.display.handle()
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn socket_name(&self) -> &str {
        &self.config.socket_name
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn client_count(&self) -> usize {
        self.connected.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Register the protocol globals, including one `wl_output` per output
    /// already known to `state`.
    pub fn start(&mut self, state: &mut CompositorState) -> Result<()> {
        if self.running {
            return Err(CoreError::state_error("Compositor already running").into());
        }
        self.register_globals();

        let mut outputs: Vec<OutputId> = state.outputs.keys().copied().collect();
        outputs.sort();
        for output in outputs {
            self.register_output_global(output);
        }

        self.running = true;
        tracing::info!("Compositor started on {}", self.config.socket_name);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Err(CoreError::state_error("Compositor not running").into());
        }
        self.display.flush_clients().context("Failed to flush clients")?;
        self.running = false;
        tracing::info!("Compositor stopped ({} clients connected)", self.client_count());
        Ok(())
    }

    fn register_globals(&mut self) {
        let dh = self.display.handle();

        wayland::compositor::register_compositor(&dh);
        wayland::compositor::register_shm(&dh);
        wayland::viewporter::register_viewporter(&dh);
        wayland::presentation_time::register_presentation_time(&dh);
        wayland::fifo::register_fifo(&dh);
        wayland::commit_timing::register_commit_timing(&dh);
        wayland::fractional_scale::register_fractional_scale(&dh);
        if self.config.color_management {
            wayland::color_management::register_color_management(&dh);
        }
    }

    fn register_output_global(&mut self, output: OutputId) {
        let global = wayland::output::register_output(&self.display.handle(), output);
        self.output_globals.insert(output, global);
    }

    // =========================================================================
    // Outputs
    // =========================================================================

    /// Add an output to the state and advertise it once running.
    pub fn add_output(
        &mut self,
        state: &mut CompositorState,
        name: impl Into<String>,
        width: i32,
        height: i32,
        refresh_rate: f32,
    ) -> OutputId {
        let output = state.add_output(name, width, height, refresh_rate);
        if self.running {
            self.register_output_global(output);
        }
        output
    }

    /// Withdraw the output's global and remove it from the state.
    pub fn remove_output(&mut self, state: &mut CompositorState, output: OutputId) -> Result<()> {
        if state.output(output).is_none() {
            return Err(CoreError::InvalidOutputId(output).into());
        }
        if let Some(global) = self.output_globals.remove(&output) {
            self.display.handle().remove_global::<CompositorState>(global);
        }
        state.remove_output(output);
        Ok(())
    }

    // =========================================================================
    // Event Processing
    // =========================================================================

    /// Accept pending client connections.
    pub fn accept_connections(&mut self) -> usize {
        let mut handle = self.display.handle();
        let mut accepted = 0;
        loop {
            let stream = match self.socket.accept() {
                Ok(Some(stream)) => stream,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    break;
                }
            };

            let id = self.next_client_id;
            self.next_client_id += 1;
            let data = ClientState { id, connected: self.connected.clone() };
            match handle.insert_client(stream, Arc::new(data)) {
                Ok(_) => accepted += 1,
                Err(e) => tracing::error!("Failed to insert client {}: {}", id, e),
            }
        }
        accepted
    }

    /// Accept connections, dispatch client requests and flush the replies.
    pub fn dispatch(&mut self, state: &mut CompositorState) -> Result<usize> {
        if !self.running {
            return Ok(0);
        }
        self.accept_connections();

        let dispatched = self
            .display
            .dispatch_clients(state)
            .context("Failed to dispatch Wayland events")?;
        self.flush()?;
        Ok(dispatched)
    }

    /// Flush all client event queues
    pub fn flush(&mut self) -> Result<()> {
        self.display.flush_clients().context("Failed to flush clients")?;
        Ok(())
    }
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("socket_path", &self.socket_path)
            .field("running", &self.running)
            .field("clients", &self.client_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::rc::Rc;

    use super::*;
    use crate::core::time::ManualClock;

    fn config() -> CompositorConfig {
        CompositorConfig { socket_name: "wayland-test".to_string(), ..CompositorConfig::default() }
    }

    #[test]
    fn test_bind_creates_socket() {
        let dir = tempfile::tempdir().unwrap();
        let compositor = Compositor::bind_in(dir.path(), config()).unwrap();
        assert!(compositor.socket_path().exists());
        assert_eq!(compositor.socket_name(), "wayland-test");
        assert!(!compositor.is_running());
    }

    #[test]
    fn test_start_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut compositor = Compositor::bind_in(dir.path(), config()).unwrap();
        let mut state = CompositorState::new(config(), Rc::new(ManualClock::new(0)));
        compositor.start(&mut state).unwrap();
        assert!(compositor.start(&mut state).is_err());
        compositor.stop().unwrap();
        assert!(compositor.stop().is_err());
    }

    #[test]
    fn test_accepts_client_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut compositor = Compositor::bind_in(dir.path(), config()).unwrap();
        let mut state = CompositorState::new(config(), Rc::new(ManualClock::new(0)));
        compositor.start(&mut state).unwrap();

        let _client = UnixStream::connect(compositor.socket_path()).unwrap();
        assert_eq!(compositor.accept_connections(), 1);
        assert_eq!(compositor.accept_connections(), 0);
    }

    #[test]
    fn test_outputs_get_globals() {
        let dir = tempfile::tempdir().unwrap();
        let mut compositor = Compositor::bind_in(dir.path(), config()).unwrap();
        let mut state = CompositorState::new(config(), Rc::new(ManualClock::new(0)));

        let first = compositor.add_output(&mut state, "HEADLESS-1", 1920, 1080, 60.0);
        compositor.start(&mut state).unwrap();
        let second = compositor.add_output(&mut state, "HEADLESS-2", 1280, 720, 60.0);
        assert_eq!(compositor.output_globals.len(), 2);

        compositor.remove_output(&mut state, first).unwrap();
        assert!(state.output(first).is_none());
        assert_eq!(state.primary_output(), Some(second));
        assert_eq!(compositor.output_globals.len(), 1);
        assert!(compositor.remove_output(&mut state, first).is_err());
    }
}
