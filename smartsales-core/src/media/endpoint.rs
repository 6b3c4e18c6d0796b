//! Device HTTP endpoint discovery
//!
//! Follows the connection state. Once the device is on Wi-Fi
//! (`WifiProvisioned` or `Syncing`) the provider asks it for its IP address
//! and publishes the media server base URL. Every new session token starts
//! a fresh discovery; any non-ready state clears the URL.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MediaConfig;
use crate::connectivity::{ConnectionState, DeviceConnectionManager};
use crate::media::url::build_base_url;

/// Token of a state in which the device HTTP server is reachable
fn ready_token(state: &ConnectionState) -> Option<String> {
    match state {
        ConnectionState::WifiProvisioned { session, .. } | ConnectionState::Syncing { session, .. } => {
            Some(session.secure_token.clone())
        }
        _ => None,
    }
}

struct Shared {
    manager: DeviceConnectionManager,
    config: MediaConfig,
    url_tx: watch::Sender<Option<String>>,
    /// Token the current discovery runs for; publishing checks it under this lock
    ready_token: StdMutex<Option<String>>,
}

impl Shared {
    fn publish_if_current(&self, token: &str, url: String) -> bool {
        let guard = match self.ready_token.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.as_deref() != Some(token) {
            return false;
        }
        self.url_tx.send_replace(Some(url));
        true
    }

    fn set_token(&self, token: Option<String>) {
        let mut guard = match self.ready_token.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = token;
        self.url_tx.send_if_modified(|url| url.take().is_some());
    }
}

/// Publishes the device media server base URL
///
/// # Example
/// ```no_run
/// use smartsales_lib::config::MediaConfig;
/// use smartsales_lib::connectivity::DeviceConnectionManager;
/// use smartsales_lib::media::DeviceEndpointProvider;
///
/// # async fn demo(manager: DeviceConnectionManager) {
/// let provider = DeviceEndpointProvider::spawn(manager, MediaConfig::default());
/// let mut urls = provider.subscribe();
/// while urls.changed().await.is_ok() {
///     if let Some(url) = urls.borrow().clone() {
///         println!("device media server at {url}");
///     }
/// }
/// # }
/// ```
pub struct DeviceEndpointProvider {
    shared: Arc<Shared>,
    refresh_tx: mpsc::UnboundedSender<()>,
    driver: StdMutex<Option<JoinHandle<()>>>,
}

impl DeviceEndpointProvider {
    /// Start following `manager`; must be called inside a Tokio runtime
    pub fn spawn(manager: DeviceConnectionManager, config: MediaConfig) -> Self {
        let (url_tx, _) = watch::channel(None);
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let states = manager.subscribe();

        let shared = Arc::new(Shared {
            manager,
            config,
            url_tx,
            ready_token: StdMutex::new(None),
        });

        let driver = Driver {
            shared: Arc::clone(&shared),
            discovery: None,
            current_token: None,
            attempted: false,
        };
        let handle = tokio::spawn(driver.run(states, refresh_rx));

        Self {
            shared,
            refresh_tx,
            driver: StdMutex::new(Some(handle)),
        }
    }

    /// Latest known base URL
    pub fn base_url(&self) -> Option<String> {
        self.shared.url_tx.borrow().clone()
    }

    /// Watch the base URL; also retries discovery when none is known yet
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        let rx = self.shared.url_tx.subscribe();
        self.refresh();
        rx
    }

    /// Retry discovery if the device is ready but has no URL yet
    pub fn refresh(&self) {
        let _ = self.refresh_tx.send(());
    }

    /// Stop following the connection and cancel discovery
    pub fn shutdown(&self) {
        let handle = match self.driver.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for DeviceEndpointProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Driver {
    shared: Arc<Shared>,
    discovery: Option<JoinHandle<()>>,
    current_token: Option<String>,
    /// Discovery already ran once for `current_token`
    attempted: bool,
}

impl Driver {
    async fn run(mut self, mut states: watch::Receiver<ConnectionState>, mut refresh_rx: mpsc::UnboundedReceiver<()>) {
        let initial = states.borrow_and_update().clone();
        self.on_state(&initial);

        loop {
            tokio::select! {
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = states.borrow_and_update().clone();
                    self.on_state(&state);
                }
                request = refresh_rx.recv() => {
                    match request {
                        Some(()) => self.request_discovery(true),
                        None => break,
                    }
                }
            }
        }
    }

    fn on_state(&mut self, state: &ConnectionState) {
        let Some(token) = ready_token(state) else {
            if self.current_token.take().is_some() {
                debug!("Device left ready state, clearing endpoint");
            }
            self.cancel_discovery();
            self.attempted = false;
            self.shared.set_token(None);
            return;
        };

        if self.current_token.as_deref() != Some(token.as_str()) {
            debug!("New device session, discovering endpoint");
            self.cancel_discovery();
            self.current_token = Some(token.clone());
            self.attempted = false;
            self.shared.set_token(Some(token));
        }
        self.request_discovery(false);
    }

    fn request_discovery(&mut self, force: bool) {
        let Some(token) = self.current_token.clone() else {
            return;
        };
        if self.shared.url_tx.borrow().is_some() {
            return;
        }
        if self.discovery.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        if !force && self.attempted {
            return;
        }

        self.attempted = true;
        self.discovery = Some(tokio::spawn(discover(Arc::clone(&self.shared), token)));
    }

    fn cancel_discovery(&mut self) {
        if let Some(handle) = self.discovery.take() {
            handle.abort();
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.cancel_discovery();
    }
}

async fn discover(shared: Arc<Shared>, token: String) {
    let max_attempts = shared.config.discovery_attempts.max(1);

    for attempt in 1..=max_attempts {
        match shared.manager.query_network_status().await {
            Ok(status) => match build_base_url(&status.ip_address, shared.config.default_port) {
                Some(url) => {
                    if shared.publish_if_current(&token, url.clone()) {
                        info!(url = %url, "Device media endpoint discovered");
                    }
                    return;
                }
                None => warn!(attempt, "Device reported an unusable address: {:?}", status.ip_address),
            },
            Err(err) => warn!(attempt, error = %err, "Network status query failed"),
        }

        if attempt < max_attempts {
            tokio::time::sleep(shared.config.discovery_backoff(attempt)).await;
        }
    }

    warn!("Giving up on endpoint discovery after {} attempts", max_attempts);
}
