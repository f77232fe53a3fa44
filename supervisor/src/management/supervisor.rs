use crate::config::ServerInstance;
use crate::error::ConfigError;
use crate::management::comm::{
    default_launcher, Launcher, ProcessFilter, ProcessHandle, ProcessLocator, SysinfoLocator,
};
use crate::management::minecraft::{McRcon, MinecraftProbe, RemoteConsole, StatusProbe};
use crate::management::status::reconcile;
use crate::management::watchdog::ForceCloseWatchdog;
use log::{error, info, warn};
use mcsl_protocol::management::instance::{ServerConfig, ServerStatus};
use std::sync::Arc;
use std::time::Duration;

/// Pause between a graceful stop and the following start.
pub const RESTART_SETTLE: Duration = Duration::from_secs(1);

/// Result of an operation that can fail for reasons worth showing to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// The supervisor's view of the outside world.
pub struct Collaborators {
    pub locator: Arc<dyn ProcessLocator>,
    pub probe: Arc<dyn StatusProbe>,
    pub console: Arc<dyn RemoteConsole>,
    pub launcher: Arc<dyn Launcher>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            locator: Arc::new(SysinfoLocator),
            probe: Arc::new(MinecraftProbe),
            console: Arc::new(McRcon),
            launcher: default_launcher(),
        }
    }
}

/// Controls one game server installation.
///
/// Holds no state about the server itself: every operation observes the
/// process table and the network afresh, so processes started or stopped
/// behind the supervisor's back are picked up.
pub struct ServerSupervisor {
    instance: Arc<ServerInstance>,
    filter: ProcessFilter,
    locator: Arc<dyn ProcessLocator>,
    probe: Arc<dyn StatusProbe>,
    console: Arc<dyn RemoteConsole>,
    launcher: Arc<dyn Launcher>,
}

impl ServerSupervisor {
    pub fn new(instance: ServerInstance) -> Self {
        Self::with_collaborators(instance, Collaborators::default())
    }

    pub fn with_collaborators(instance: ServerInstance, collaborators: Collaborators) -> Self {
        let filter = ProcessFilter::new(
            instance.process_name.clone(),
            instance.working_directory.clone(),
        );
        Self {
            instance: Arc::new(instance),
            filter,
            locator: collaborators.locator,
            probe: collaborators.probe,
            console: collaborators.console,
            launcher: collaborators.launcher,
        }
    }

    pub fn from_config(config: ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(ServerInstance::from_config(config)?))
    }

    /// See [`ServerInstance::from_server_properties`].
    pub fn from_server_properties(config: ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(ServerInstance::from_server_properties(config)?))
    }

    pub fn instance(&self) -> &ServerInstance {
        &self.instance
    }

    /// Server processes running in the working directory, oldest first.
    pub fn processes(&self) -> Vec<Arc<dyn ProcessHandle>> {
        self.locator.find(&self.filter)
    }

    pub async fn status(&self) -> ServerStatus {
        let runtimes: Vec<Duration> = self
            .processes()
            .iter()
            .filter(|p| p.is_alive())
            .map(|p| p.elapsed())
            .collect();
        if runtimes.is_empty() {
            return ServerStatus::Offline;
        }

        let network_ready = self.ping().await.is_some();
        reconcile(runtimes, network_ready, self.instance.max_start_duration)
    }

    /// Launches the server.
    ///
    /// Unless `ignore_checks` is set, refuses to start a server that is
    /// running or starting, and replaces an anomalous one. `force_restart`
    /// kills whatever is running first. Does not wait for the server to
    /// become ready.
    pub async fn start(&self, ignore_checks: bool, force_restart: bool) -> Outcome {
        if !ignore_checks {
            match self.status().await {
                status if status.is_running() => {
                    info!("[{}] start skipped, server is {}", self.instance.name, status);
                    return Outcome::failure(format!(
                        "Server is already running or starting ({}).",
                        status
                    ));
                }
                ServerStatus::Anomaly => {
                    warn!(
                        "[{}] server did not come up within {:?}, restarting",
                        self.instance.name, self.instance.max_start_duration
                    );
                    self.shut_down(true, true).await;
                    return match self.launch() {
                        Ok(_) => Outcome::success("Server restarted after anomaly."),
                        Err(outcome) => outcome,
                    };
                }
                _ => {}
            }
        }

        if force_restart {
            self.force_stop().await;
        }
        match self.launch() {
            Ok(_) => Outcome::success("Server started."),
            Err(outcome) => outcome,
        }
    }

    fn launch(&self) -> Result<u32, Outcome> {
        let instance = &self.instance;
        match self
            .launcher
            .launch(&instance.launch_command, &instance.working_directory)
        {
            Ok(pid) => {
                info!("[{}] launched server process {}", instance.name, pid);
                Ok(pid)
            }
            Err(err) => {
                error!("[{}] failed to launch server: {}", instance.name, err);
                Err(Outcome::failure(err.to_string()))
            }
        }
    }

    /// Asks the server to stop over the remote console and makes sure its
    /// processes are gone within the grace window, killing them otherwise.
    ///
    /// With `yield_until_closed` the call returns once the processes are
    /// gone; otherwise the cleanup runs as a detached task that outlives the
    /// supervisor. Either way the grace window starts now. Returns whether
    /// the stop command itself went through.
    pub async fn stop(&self, yield_until_closed: bool) -> bool {
        if self.status().await == ServerStatus::Offline {
            info!("[{}] stop skipped, server is offline", self.instance.name);
            return false;
        }

        let outcome = self.run_command("stop").await;
        info!(
            "[{}] stop attempt, success: {}\n{}",
            self.instance.name, outcome.success, outcome.message
        );

        let watchdog = ForceCloseWatchdog::new(self.instance.name.clone(), self.processes());
        if yield_until_closed {
            watchdog.run().await;
        } else if !watchdog.is_empty() {
            tokio::spawn(watchdog.run());
        }
        outcome.success
    }

    /// Stops the server, optionally saving first, then starts it with the
    /// usual checks.
    pub async fn restart(&self, force_close: bool, save: bool) -> Outcome {
        self.shut_down(force_close, save).await;
        self.start(false, false).await
    }

    async fn shut_down(&self, force_close: bool, save: bool) {
        info!(
            "[{}] restarting (force close: {}, save: {})",
            self.instance.name, force_close, save
        );
        if save {
            self.save_world().await;
        }
        if force_close {
            self.force_stop().await;
        } else {
            self.stop(true).await;
            tokio::time::sleep(RESTART_SETTLE).await;
        }
    }

    /// Kills every server process. Returns `true` if at least one was
    /// terminated.
    pub async fn force_stop(&self) -> bool {
        let mut terminated = false;
        for process in self.processes() {
            if process.terminate() {
                info!("[{}] terminated process {}", self.instance.name, process.pid());
                terminated = true;
            } else {
                warn!(
                    "[{}] failed to terminate process {}",
                    self.instance.name,
                    process.pid()
                );
            }
        }
        terminated
    }

    /// Runs one command over a fresh remote console session.
    ///
    /// The message is the command output on success and the error
    /// description otherwise.
    pub async fn run_command(&self, command: &str) -> Outcome {
        let instance = &self.instance;
        let mut session = match self
            .console
            .open(&instance.console, instance.connection_timeout)
            .await
        {
            Ok(session) => session,
            Err(err) => return Outcome::failure(err.to_string()),
        };

        let outcome = match session.send(command).await {
            Ok(output) => Outcome::success(output),
            Err(err) => Outcome::failure(err.to_string()),
        };
        if let Err(err) = session.close().await {
            warn!("[{}] failed to close remote console: {}", instance.name, err);
        }
        outcome
    }

    pub async fn is_remote_console_working(&self) -> bool {
        self.run_command("list").await.success
    }

    pub async fn save_world(&self) -> bool {
        let outcome = self.run_command("save-all").await;
        info!(
            "[{}] save attempt, success: {}\n{}",
            self.instance.name, outcome.success, outcome.message
        );
        outcome.success
    }

    pub async fn broadcast_message(&self, text: &str) -> bool {
        let outcome = self.run_command(&format!("say {}", text)).await;
        info!(
            "[{}] say attempt, success: {}\n{}",
            self.instance.name, outcome.success, outcome.message
        );
        outcome.success
    }

    /// Names of the players online, `None` when the server cannot be queried.
    pub async fn online_players(&self) -> Option<Vec<String>> {
        self.probe
            .query(&self.instance.game, self.instance.connection_timeout)
            .await
            .map(|status| status.players)
            .ok()
    }

    /// Status ping round trip, `None` when the server does not answer.
    pub async fn ping(&self) -> Option<Duration> {
        self.probe
            .ping(&self.instance.game, self.instance.connection_timeout)
            .await
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfigBuilder;
    use crate::management::testing::{FakeConsole, FakeLauncher, FakeLocator, FakeProbe};
    use crate::management::watchdog::FORCE_CLOSE_GRACE;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    struct Harness {
        supervisor: ServerSupervisor,
        locator: Arc<FakeLocator>,
        probe: Arc<FakeProbe>,
        console: Arc<FakeConsole>,
        launcher: Arc<FakeLauncher>,
        _dir: TempDir,
    }

    fn instance(dir: &TempDir, rcon_port: u16) -> ServerInstance {
        ServerConfigBuilder::new()
            .working_directory(dir.path())
            .target("server.jar")
            .rcon_port(rcon_port)
            .rcon_password("s3cret")
            .max_start_secs(180)
            .connection_timeout_secs(1)
            .resolve()
            .unwrap()
    }

    fn harness(network_ready: bool) -> Harness {
        let _ = pretty_env_logger::try_init();
        let dir = TempDir::new().unwrap();
        let locator = Arc::new(FakeLocator::default());
        let probe = Arc::new(FakeProbe::new(network_ready));
        let console = Arc::new(FakeConsole::new(locator.clone()));
        let launcher = Arc::new(FakeLauncher::new(locator.clone()));
        let supervisor = ServerSupervisor::with_collaborators(
            instance(&dir, 25575),
            Collaborators {
                locator: locator.clone(),
                probe: probe.clone(),
                console: console.clone(),
                launcher: launcher.clone(),
            },
        );
        Harness {
            supervisor,
            locator,
            probe,
            console,
            launcher,
            _dir: dir,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn offline_without_processes() {
        let h = harness(true);

        assert_eq!(h.supervisor.status().await, ServerStatus::Offline);
        // the probe is not even consulted
        assert_eq!(h.probe.pings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn status_follows_runtime_and_probe() {
        let h = harness(false);

        let process = h.locator.add(Duration::from_secs(170));
        assert_eq!(h.supervisor.status().await, ServerStatus::Starting);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(h.supervisor.status().await, ServerStatus::Anomaly);

        h.probe.ready.store(true, Ordering::SeqCst);
        assert_eq!(h.supervisor.status().await, ServerStatus::Online);

        process.exit_after(Duration::ZERO);
        assert_eq!(h.supervisor.status().await, ServerStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn freshly_started_ready_server_is_online() {
        let h = harness(true);
        h.locator.add(Duration::from_secs(5));

        assert_eq!(h.supervisor.status().await, ServerStatus::Online);
        assert_eq!(h.supervisor.ping().await, Some(Duration::from_micros(12_300)));
    }

    #[tokio::test(start_paused = true)]
    async fn one_probe_per_status_call() {
        let h = harness(false);
        h.locator.add(Duration::from_secs(10));
        h.locator.add(Duration::from_secs(400));

        assert_eq!(h.supervisor.status().await, ServerStatus::Anomaly);
        assert_eq!(h.probe.pings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_when_offline() {
        let h = harness(false);

        let outcome = h.supervisor.start(false, false).await;
        assert_eq!(outcome, Outcome::success("Server started."));
        assert_eq!(h.launcher.launches(), 1);
        assert_eq!(h.supervisor.status().await, ServerStatus::Starting);
    }

    #[tokio::test(start_paused = true)]
    async fn start_refused_when_running_or_starting() {
        let h = harness(true);
        h.locator.add(Duration::from_secs(60));

        let outcome = h.supervisor.start(false, false).await;
        assert_eq!(
            outcome,
            Outcome::failure("Server is already running or starting (Online).")
        );

        h.probe.ready.store(false, Ordering::SeqCst);
        let outcome = h.supervisor.start(false, true).await;
        assert_eq!(
            outcome,
            Outcome::failure("Server is already running or starting (Starting).")
        );
        assert_eq!(h.launcher.launches(), 0);
        assert_eq!(h.locator.alive().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_replaces_anomalous_server() {
        let h = harness(false);
        let stuck = h.locator.add(Duration::from_secs(600));

        let outcome = h.supervisor.start(false, false).await;

        assert_eq!(outcome, Outcome::success("Server restarted after anomaly."));
        assert!(stuck.was_killed());
        assert_eq!(h.console.commands(), vec!["save-all"]);
        assert_eq!(h.launcher.launches(), 1);
        let alive = h.locator.alive();
        assert_eq!(alive.len(), 1);
        assert_ne!(alive[0].pid(), stuck.pid());
    }

    #[tokio::test(start_paused = true)]
    async fn start_ignoring_checks_with_force_restart() {
        let h = harness(true);
        let old = h.locator.add(Duration::from_secs(60));

        let outcome = h.supervisor.start(true, true).await;

        assert!(outcome.success);
        assert!(old.was_killed());
        assert_eq!(h.locator.alive().len(), 1);
        assert_eq!(h.probe.pings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_launch_is_reported() {
        let h = harness(false);
        h.launcher.fail.store(true, Ordering::SeqCst);

        let outcome = h.supervisor.start(false, false).await;

        assert!(!outcome.success);
        assert!(outcome.message.contains("server.jar"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_offline_server_does_nothing() {
        let h = harness(true);

        assert!(!h.supervisor.stop(true).await);
        assert!(h.console.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_wait_until_closed() {
        let h = harness(true);
        let process = h.locator.add(Duration::from_secs(60));

        assert!(h.supervisor.stop(true).await);

        assert_eq!(h.console.commands(), vec!["stop"]);
        assert!(!process.was_killed());
        assert!(h.supervisor.processes().is_empty());
        assert_eq!(h.supervisor.status().await, ServerStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_kills_server_ignoring_the_console() {
        let h = harness(true);
        let process = h.locator.add(Duration::from_secs(60));
        h.console.reachable.store(false, Ordering::SeqCst);
        let started = Instant::now();

        assert!(!h.supervisor.stop(true).await);

        assert!(process.was_killed());
        assert!(started.elapsed() >= FORCE_CLOSE_GRACE);
        assert_eq!(h.supervisor.status().await, ServerStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_in_background() {
        let h = harness(true);
        let process = h.locator.add(Duration::from_secs(60));
        h.console.reachable.store(false, Ordering::SeqCst);

        assert!(!h.supervisor.stop(false).await);
        assert!(!process.was_killed());

        tokio::time::sleep(FORCE_CLOSE_GRACE + Duration::from_secs(1)).await;
        assert!(process.was_killed());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_background_stops_keep_their_grace_window() {
        let h = harness(true);
        h.console.reachable.store(false, Ordering::SeqCst);
        let stuck = h.locator.add(Duration::from_secs(60));
        stuck.set_killable(false);

        assert!(!h.supervisor.stop(false).await);
        assert!(!h.supervisor.stop(false).await);
        let late = h.locator.add(Duration::from_secs(1));
        assert!(!h.supervisor.stop(false).await);

        tokio::time::sleep(FORCE_CLOSE_GRACE + Duration::from_secs(1)).await;
        assert!(late.was_killed());
        assert!(stuck.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn background_stop_outlives_the_supervisor() {
        let h = harness(true);
        h.console.reachable.store(false, Ordering::SeqCst);
        let first = h.locator.add(Duration::from_secs(60));
        assert!(!h.supervisor.stop(false).await);
        let second = h.locator.add(Duration::from_secs(1));
        assert!(!h.supervisor.stop(false).await);

        drop(h.supervisor);
        tokio::time::sleep(FORCE_CLOSE_GRACE + Duration::from_secs(1)).await;

        assert!(first.was_killed());
        assert!(second.was_killed());
        assert!(h.locator.alive().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_wait_outlasts_stubborn_processes() {
        let h = harness(true);
        h.console.reachable.store(false, Ordering::SeqCst);
        let stuck = h.locator.add(Duration::from_secs(60));
        stuck.set_killable(false);
        let relent = {
            let stuck = stuck.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(40)).await;
                stuck.set_killable(true);
            })
        };

        assert!(!h.supervisor.stop(true).await);

        assert!(h.supervisor.processes().is_empty());
        assert_eq!(h.supervisor.status().await, ServerStatus::Offline);
        relent.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_restart() {
        let h = harness(false);
        let old = h.locator.add(Duration::from_secs(30));
        let started = Instant::now();

        let outcome = h.supervisor.restart(false, true).await;

        assert_eq!(outcome, Outcome::success("Server started."));
        assert_eq!(h.console.commands(), vec!["save-all", "stop"]);
        assert!(!old.is_alive());
        assert!(!old.was_killed());
        assert!(started.elapsed() >= RESTART_SETTLE);
        assert_eq!(h.launcher.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_restart_without_save() {
        let h = harness(true);
        let old = h.locator.add(Duration::from_secs(30));

        let outcome = h.supervisor.restart(true, false).await;

        assert!(outcome.success);
        assert!(old.was_killed());
        assert!(h.console.commands().is_empty());
        assert_eq!(h.locator.alive().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn force_stop_reports_whether_anything_was_killed() {
        let h = harness(true);
        assert!(!h.supervisor.force_stop().await);

        let first = h.locator.add(Duration::from_secs(5));
        let second = h.locator.add(Duration::from_secs(6));
        assert!(h.supervisor.force_stop().await);
        assert!(first.was_killed() && second.was_killed());
        assert_eq!(h.supervisor.status().await, ServerStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn console_commands() {
        let h = harness(true);

        assert!(h.supervisor.is_remote_console_working().await);
        assert!(h.supervisor.save_world().await);
        assert!(h.supervisor.broadcast_message("restart in 5 minutes").await);
        let outcome = h.supervisor.run_command("seed").await;
        assert_eq!(outcome, Outcome::success("Unknown command: seed"));
        assert_eq!(
            h.console.commands(),
            vec!["list", "save-all", "say restart in 5 minutes", "seed"]
        );

        h.console.reachable.store(false, Ordering::SeqCst);
        assert!(!h.supervisor.is_remote_console_working().await);
        assert!(!h.supervisor.broadcast_message("hello").await);
    }

    #[tokio::test(start_paused = true)]
    async fn players_and_ping_are_none_when_unreachable() {
        let h = harness(true);
        *h.probe.players.lock().unwrap() = vec!["Steve".into(), "Alex".into()];
        assert_eq!(
            h.supervisor.online_players().await,
            Some(vec!["Steve".to_string(), "Alex".to_string()])
        );

        h.probe.ready.store(false, Ordering::SeqCst);
        assert_eq!(h.supervisor.online_players().await, None);
        assert_eq!(h.supervisor.ping().await, None);
    }

    #[tokio::test]
    async fn run_command_against_unreachable_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dir = TempDir::new().unwrap();
        let supervisor = ServerSupervisor::new(instance(&dir, port));
        let outcome = supervisor.run_command("list").await;

        assert!(!outcome.success);
        assert!(outcome.message.contains("failed to connect"));
    }
}
