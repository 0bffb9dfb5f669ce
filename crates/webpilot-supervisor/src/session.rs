//! Per-session state: the authenticated user/store pairing, the
//! single-active-agent invariant, and the shared handle multiple tasks
//! (decision loop, screenshot pump, heartbeat) coordinate through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use eoka::{Browser, Page, StealthConfig};
use tokio::sync::watch;
use webpilot_types::{AuthVerifier, InMemoryStore, ModelClient, Result, SessionId, StoreAdapter, UserId};

/// The subset of the binary's server config the Supervisor itself
/// consumes (heartbeat cadence, screenshot pump cadence, the Decision
/// Loop's iteration cap). Bind address and model endpoint/key stay in the
/// binary's own config since this crate never opens a listening socket
/// or talks to the model HTTP endpoint directly.
///
/// A connection is dropped as dead if no pong/heartbeat control message
/// arrives within one `heartbeat_interval` tick of a ping being sent.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub heartbeat_interval: Duration,
    pub live_pump_interval: Duration,
    pub replay_pump_interval: Duration,
    pub max_iterations: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            live_pump_interval: Duration::from_secs(1),
            replay_pump_interval: Duration::from_millis(500),
            max_iterations: 25,
        }
    }
}

/// Per-session state the Supervisor tracks from authentication through
/// cleanup. One `SessionHandle` per live WebSocket connection.
pub struct SessionHandle {
    pub session_id: SessionId,
    pub user_id: UserId,
    agent_started: AtomicBool,
    pub latest_screenshot: watch::Sender<Option<Vec<u8>>>,
}

impl SessionHandle {
    pub fn new(user_id: UserId) -> Arc<Self> {
        let (tx, _rx) = watch::channel(None);
        Arc::new(Self {
            session_id: SessionId::new(),
            user_id,
            agent_started: AtomicBool::new(false),
            latest_screenshot: tx,
        })
    }

    /// Enforces the exactly-one-agent-per-session invariant. Returns
    /// `false` if an agent was already started on this session - the
    /// caller should reject the second `start_*` message as an error.
    pub fn try_start_agent(&self) -> bool {
        self.agent_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Builds a `StoreAdapter` scoped to one authenticated user. A production
/// deployment wires a database-backed factory here; this repository
/// ships one backed by `InMemoryStore`, enough for the `serve` binary
/// and for tests.
pub trait StoreFactory: Send + Sync {
    fn for_user(&self, user_id: UserId) -> Arc<dyn StoreAdapter>;
}

pub struct InMemoryStoreFactory;

impl StoreFactory for InMemoryStoreFactory {
    fn for_user(&self, user_id: UserId) -> Arc<dyn StoreAdapter> {
        Arc::new(InMemoryStore::new(user_id))
    }
}

/// Shared state handed to every connection handler by axum's `State`
/// extractor.
pub struct AppState {
    pub auth: Arc<dyn AuthVerifier>,
    pub store_factory: Arc<dyn StoreFactory>,
    pub model: Arc<dyn ModelClient>,
    pub sessions: DashMap<SessionId, Arc<SessionHandle>>,
    pub config: SupervisorConfig,
}

impl AppState {
    pub fn new(
        auth: Arc<dyn AuthVerifier>,
        store_factory: Arc<dyn StoreFactory>,
        model: Arc<dyn ModelClient>,
    ) -> Arc<Self> {
        Self::with_config(auth, store_factory, model, SupervisorConfig::default())
    }

    pub fn with_config(
        auth: Arc<dyn AuthVerifier>,
        store_factory: Arc<dyn StoreFactory>,
        model: Arc<dyn ModelClient>,
        config: SupervisorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            auth,
            store_factory,
            model,
            sessions: DashMap::new(),
            config,
        })
    }
}

/// Launch a fresh Browser + blank Page for one session's agent.
pub async fn launch_browser(headless: bool) -> Result<(Browser, Page)> {
    let browser = Browser::launch_with_config(StealthConfig {
        headless,
        ..Default::default()
    })
    .await?;
    let page = browser.new_page("about:blank").await?;
    Ok((browser, page))
}
