//! In-memory collaborators for exercising the supervisor without a real
//! server. Time is tokio time, so tests can run with a paused clock.

use crate::config::{ConsoleEndpoint, GameEndpoint, LaunchCommand};
use crate::error::{ConsoleError, LaunchError, ProbeError};
use crate::management::comm::{Launcher, ProcessFilter, ProcessHandle, ProcessLocator};
use crate::management::minecraft::{ConsoleSession, RemoteConsole, StatusProbe};
use async_trait::async_trait;
use mcsl_protocol::management::minecraft::query::QueryStatus;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub struct FakeProcess {
    pid: u32,
    created: Instant,
    runtime_at_creation: Duration,
    exit_at: Mutex<Option<Instant>>,
    killable: AtomicBool,
    killed: AtomicBool,
}

impl FakeProcess {
    /// A live process that has already been running for `runtime`.
    pub fn new(pid: u32, runtime: Duration) -> Arc<Self> {
        Arc::new(Self {
            pid,
            created: Instant::now(),
            runtime_at_creation: runtime,
            exit_at: Mutex::new(None),
            killable: AtomicBool::new(true),
            killed: AtomicBool::new(false),
        })
    }

    pub fn exit_after(&self, delay: Duration) {
        *self.exit_at.lock().unwrap() = Some(Instant::now() + delay);
    }

    pub fn set_killable(&self, killable: bool) {
        self.killable.store(killable, Ordering::SeqCst);
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_alive(&self) -> bool {
        !self.was_killed()
            && self
                .exit_at
                .lock()
                .unwrap()
                .map_or(true, |exit_at| Instant::now() < exit_at)
    }

    fn elapsed(&self) -> Duration {
        self.runtime_at_creation + self.created.elapsed()
    }

    fn terminate(&self) -> bool {
        if self.killable.load(Ordering::SeqCst) {
            self.killed.store(true, Ordering::SeqCst);
        }
        !self.is_alive()
    }
}

/// Process table shared by the fake locator, launcher and console.
#[derive(Default)]
pub struct FakeLocator {
    processes: Mutex<Vec<Arc<FakeProcess>>>,
    next_pid: AtomicU32,
}

impl FakeLocator {
    pub fn add(&self, runtime: Duration) -> Arc<FakeProcess> {
        let pid = 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        let process = FakeProcess::new(pid, runtime);
        self.processes.lock().unwrap().push(process.clone());
        process
    }

    pub fn alive(&self) -> Vec<Arc<FakeProcess>> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.is_alive())
            .cloned()
            .collect()
    }

    /// Makes every live process exit after `delay`, like a server shutting
    /// down in response to `stop`.
    pub fn exit_all_after(&self, delay: Duration) {
        for process in self.alive() {
            process.exit_after(delay);
        }
    }
}

impl ProcessLocator for FakeLocator {
    fn find(&self, _filter: &ProcessFilter) -> Vec<Arc<dyn ProcessHandle>> {
        self.alive()
            .into_iter()
            .map(|p| p as Arc<dyn ProcessHandle>)
            .collect()
    }
}

pub struct FakeProbe {
    pub ready: AtomicBool,
    pub latency: Duration,
    pub players: Mutex<Vec<String>>,
    pub pings: AtomicUsize,
}

impl FakeProbe {
    pub fn new(ready: bool) -> Self {
        Self {
            ready: AtomicBool::new(ready),
            latency: Duration::from_micros(12_300),
            players: Mutex::new(vec![]),
            pings: AtomicUsize::new(0),
        }
    }

    fn check(&self, timeout: Duration) -> Result<(), ProbeError> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProbeError::Timeout(timeout))
        }
    }
}

#[async_trait]
impl StatusProbe for FakeProbe {
    async fn ping(&self, _endpoint: &GameEndpoint, timeout: Duration) -> Result<Duration, ProbeError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.check(timeout)?;
        Ok(self.latency)
    }

    async fn query(&self, _endpoint: &GameEndpoint, timeout: Duration) -> Result<QueryStatus, ProbeError> {
        self.check(timeout)?;
        let players = self.players.lock().unwrap().clone();
        Ok(QueryStatus {
            motd: "A Minecraft Server".into(),
            version: "1.20.4".into(),
            map: "world".into(),
            online: players.len() as u32,
            max: 20,
            players,
            raw: HashMap::new(),
        })
    }
}

/// Remote console that records every command. `stop` makes the processes
/// of the attached locator exit one second later.
pub struct FakeConsole {
    pub reachable: AtomicBool,
    pub commands: Arc<Mutex<Vec<String>>>,
    locator: Arc<FakeLocator>,
}

impl FakeConsole {
    pub fn new(locator: Arc<FakeLocator>) -> Self {
        Self {
            reachable: AtomicBool::new(true),
            commands: Arc::new(Mutex::new(vec![])),
            locator,
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteConsole for FakeConsole {
    async fn open(
        &self,
        endpoint: &ConsoleEndpoint,
        _timeout: Duration,
    ) -> Result<Box<dyn ConsoleSession>, ConsoleError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(ConsoleError::Connect {
                addr: endpoint.addr(),
                source: std::io::ErrorKind::ConnectionRefused.into(),
            });
        }
        Ok(Box::new(FakeSession {
            commands: self.commands.clone(),
            locator: self.locator.clone(),
        }))
    }
}

struct FakeSession {
    commands: Arc<Mutex<Vec<String>>>,
    locator: Arc<FakeLocator>,
}

#[async_trait]
impl ConsoleSession for FakeSession {
    async fn send(&mut self, command: &str) -> Result<String, ConsoleError> {
        self.commands.lock().unwrap().push(command.to_owned());
        let output = match command {
            "stop" => {
                self.locator.exit_all_after(Duration::from_secs(1));
                "Stopping the server".to_owned()
            }
            "list" => "There are 0 of a max of 20 players online: ".to_owned(),
            "save-all" => "Saved the game".to_owned(),
            other => match other.strip_prefix("say ") {
                Some(text) => format!("[Server] {}", text),
                None => format!("Unknown command: {}", other),
            },
        };
        Ok(output)
    }

    async fn close(&mut self) -> Result<(), ConsoleError> {
        Ok(())
    }
}

/// Launcher that registers a fresh process with the fake locator.
pub struct FakeLauncher {
    pub fail: AtomicBool,
    pub launches: AtomicUsize,
    locator: Arc<FakeLocator>,
}

impl FakeLauncher {
    pub fn new(locator: Arc<FakeLocator>) -> Self {
        Self {
            fail: AtomicBool::new(false),
            launches: AtomicUsize::new(0),
            locator,
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, command: &LaunchCommand, _working_dir: &Path) -> Result<u32, LaunchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LaunchError::MissingTarget(command.target.clone()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(self.locator.add(Duration::ZERO).pid())
    }
}
