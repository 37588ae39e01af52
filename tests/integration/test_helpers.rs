// tests/integration/test_helpers.rs

//! Test doubles for the transport, process, and update seams.

use async_trait::async_trait;
use launchsite::core::LaunchSiteError;
use launchsite::core::process::{LaunchSpec, ManagedProcess, PollSchedule, ProcessBackend, ProcessController};
use launchsite::core::rcon::{
    ConnectionState, EventHandler, IdSource, RconClient, RconSettings, Transport, TransportEvent,
};
use launchsite::core::updater::UpdateGateway;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Installs a quiet subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// The chat identifier used by every test client.
pub const CHAT_IDENTIFIER: i32 = -1;

pub fn settings() -> RconSettings {
    RconSettings {
        host: "127.0.0.1".to_string(),
        port: 28016,
        password: "hunter2".to_string(),
        log_messages: false,
        chat_identifier: CHAT_IDENTIFIER,
    }
}

/// A reply frame as the game server would send it.
pub fn reply(identifier: i32, message: &str) -> String {
    serde_json::json!({
        "Identifier": identifier,
        "Message": message,
        "Type": "Generic",
    })
    .to_string()
}

/// A command frame captured by `FakeTransport`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SentCommand {
    pub identifier: i32,
    pub message: String,
    pub name: String,
}

/// Computes the reply body for a sent command, if any.
pub type Responder = Arc<dyn Fn(&SentCommand) -> Option<String> + Send + Sync>;

/// An in-memory transport. Open by default.
pub struct FakeTransport {
    state: Mutex<ConnectionState>,
    handler: Mutex<Option<EventHandler>>,
    sent: Mutex<Vec<SentCommand>>,
    responder: Mutex<Option<Responder>>,
    closed: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ConnectionState::Open),
            handler: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Answers every sent command for which `responder` returns a body.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&SentCommand) -> Option<String> + Send + Sync + 'static,
    {
        *self.responder.lock() = Some(Arc::new(responder));
    }

    /// Pushes a raw inbound frame through the client's event handler.
    pub fn deliver(&self, text: &str) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(TransportEvent::Message(text.to_string()));
        }
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn start(&self, _url: String, on_event: EventHandler) {
        *self.handler.lock() = Some(on_event);
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    async fn send(&self, payload: String) -> Result<(), LaunchSiteError> {
        let command: SentCommand = serde_json::from_str(&payload)?;
        self.sent.lock().push(command.clone());

        let responder = self.responder.lock().clone();
        if let Some(responder) = responder
            && let Some(body) = responder(&command)
        {
            self.deliver(&reply(command.identifier, &body));
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Replays a fixed list of identifiers, then counts up from 1000.
pub struct SequenceIds {
    queue: Mutex<VecDeque<i32>>,
    next: Mutex<i32>,
}

impl SequenceIds {
    pub fn new(ids: Vec<i32>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(ids.into()),
            next: Mutex::new(1000),
        })
    }
}

impl IdSource for SequenceIds {
    fn next_id(&self) -> i32 {
        if let Some(id) = self.queue.lock().pop_front() {
            return id;
        }
        let mut next = self.next.lock();
        *next += 1;
        *next
    }
}

pub fn client(transport: Arc<FakeTransport>, ids: Arc<SequenceIds>) -> Arc<RconClient> {
    Arc::new(RconClient::connect(settings(), transport, ids))
}

/// Everything observable about the fake server process.
#[derive(Debug, Default)]
pub struct ProcessLog {
    pub running: bool,
    pub spawns: u32,
    pub exit_code: Option<i32>,
    /// Stop steps in the order they happened: `quit`, `interrupt`, `terminate`.
    pub events: Vec<&'static str>,
}

pub type SharedLog = Arc<Mutex<ProcessLog>>;

struct FakeProcess {
    log: SharedLog,
    interrupt_stops: bool,
}

impl ManagedProcess for FakeProcess {
    fn id(&self) -> u32 {
        4242
    }

    fn is_running(&mut self) -> bool {
        self.log.lock().running
    }

    fn supports_interrupt(&self) -> bool {
        true
    }

    fn interrupt(&mut self) -> Result<(), LaunchSiteError> {
        let mut log = self.log.lock();
        log.events.push("interrupt");
        if self.interrupt_stops {
            log.running = false;
            log.exit_code = Some(0);
        }
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), LaunchSiteError> {
        let mut log = self.log.lock();
        log.events.push("terminate");
        log.running = false;
        log.exit_code = None;
        Ok(())
    }

    fn exit_code(&self) -> Option<i32> {
        self.log.lock().exit_code
    }
}

/// A process backend whose processes live only in a shared log.
pub struct FakeBackend {
    pub log: SharedLog,
    pub fail_spawn: AtomicBool,
    /// Spawned processes never report as running.
    pub stillborn: bool,
    pub interrupt_stops: bool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(ProcessLog::default())),
            fail_spawn: AtomicBool::new(false),
            stillborn: false,
            interrupt_stops: true,
        })
    }

    pub fn with(stillborn: bool, interrupt_stops: bool) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(ProcessLog::default())),
            fail_spawn: AtomicBool::new(false),
            stillborn,
            interrupt_stops,
        })
    }

    /// Simulates the server dying on its own.
    pub fn crash(&self) {
        let mut log = self.log.lock();
        log.running = false;
        log.exit_code = Some(1);
    }

    pub fn spawns(&self) -> u32 {
        self.log.lock().spawns
    }

    pub fn running(&self) -> bool {
        self.log.lock().running
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.log.lock().events.clone()
    }
}

impl ProcessBackend for FakeBackend {
    fn spawn(&self, _spec: &LaunchSpec) -> Result<Box<dyn ManagedProcess>, LaunchSiteError> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(LaunchSiteError::Process("spawn refused".to_string()));
        }
        {
            let mut log = self.log.lock();
            log.spawns += 1;
            log.running = !self.stillborn;
            log.exit_code = None;
        }
        Ok(Box::new(FakeProcess {
            log: self.log.clone(),
            interrupt_stops: self.interrupt_stops,
        }))
    }
}

/// A responder that plays a well-behaved server: `serverinfo` reports
/// `players`, and `quit` stops the process.
pub fn server_responder(
    log: SharedLog,
    players: u64,
) -> impl Fn(&SentCommand) -> Option<String> + Send + Sync + 'static {
    move |command: &SentCommand| match command.message.as_str() {
        "serverinfo" => Some(
            serde_json::json!({ "Players": players, "Protocol": "2593.216.1" }).to_string(),
        ),
        "quit" => {
            let mut log = log.lock();
            log.events.push("quit");
            log.running = false;
            log.exit_code = Some(0);
            Some(String::new())
        }
        _ => None,
    }
}

pub fn launch_spec() -> LaunchSpec {
    LaunchSpec {
        program: PathBuf::from("/srv/rust/runds.sh"),
        args: vec!["+server.identity".to_string(), "main".to_string()],
        working_dir: PathBuf::from("/srv/rust"),
    }
}

pub const FAST_POLL: PollSchedule = PollSchedule {
    interval: Duration::from_secs(1),
    attempts: 3,
};

pub fn controller(
    backend: Arc<FakeBackend>,
    rcon: Arc<RconClient>,
    shutdown_delay: Duration,
) -> ProcessController {
    ProcessController::new(backend, rcon, launch_spec(), shutdown_delay)
        .with_poll_schedules(FAST_POLL, FAST_POLL)
}

/// Counters and canned answers for the update contract.
#[derive(Debug, Default)]
pub struct GatewayLog {
    pub server_checks: u32,
    pub framework_checks: u32,
    pub server_updates: u32,
    pub framework_updates: u32,
    pub server_outdated: bool,
    pub framework_outdated: bool,
    /// Updates that leave the artifact outdated before one finally sticks.
    pub server_failures: u32,
    pub framework_failures: u32,
    pub suppressed: Vec<bool>,
    /// Every gateway call in order: `check_server`, `update_framework`, ...
    pub calls: Vec<&'static str>,
}

#[derive(Default)]
pub struct FakeGateway {
    pub log: Mutex<GatewayLog>,
}

impl FakeGateway {
    pub fn new(server_outdated: bool, framework_outdated: bool) -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(GatewayLog {
                server_outdated,
                framework_outdated,
                ..GatewayLog::default()
            }),
        })
    }
}

#[async_trait]
impl UpdateGateway for FakeGateway {
    async fn check_server(&self) -> bool {
        let mut log = self.log.lock();
        log.server_checks += 1;
        log.calls.push("check_server");
        log.server_outdated
    }

    async fn check_framework(&self) -> bool {
        let mut log = self.log.lock();
        log.framework_checks += 1;
        log.calls.push("check_framework");
        log.framework_outdated
    }

    async fn update_server(&self) {
        let mut log = self.log.lock();
        log.server_updates += 1;
        log.calls.push("update_server");
        if log.server_failures > 0 {
            log.server_failures -= 1;
        } else {
            log.server_outdated = false;
        }
    }

    async fn update_framework(&self, suppress_warning: bool) {
        let mut log = self.log.lock();
        log.framework_updates += 1;
        log.calls.push("update_framework");
        log.suppressed.push(suppress_warning);
        if log.framework_failures > 0 {
            log.framework_failures -= 1;
        } else {
            log.framework_outdated = false;
        }
    }
}
