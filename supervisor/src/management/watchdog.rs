use crate::management::comm::ProcessHandle;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Time a stopping server gets to exit on its own before it is killed.
pub const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(10);

/// Polls between two warnings about processes that survive termination.
const WARN_EVERY: u32 = 40;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchdogReport {
    /// Pids that exited on their own.
    pub exited: Vec<u32>,
    pub terminated: Vec<u32>,
}

/// Makes sure a set of stopping server processes really goes away.
///
/// The grace window is measured from construction, so a watchdog that is
/// only polled later still kills on time. [`run`](Self::run) returns once
/// every watched process is gone, retrying termination as long as needed.
pub struct ForceCloseWatchdog {
    name: String,
    processes: Vec<Arc<dyn ProcessHandle>>,
    deadline: Instant,
}

impl ForceCloseWatchdog {
    /// Watches exactly `processes`; processes started later are not affected.
    pub fn new(name: impl Into<String>, processes: Vec<Arc<dyn ProcessHandle>>) -> Self {
        Self {
            name: name.into(),
            processes,
            deadline: Instant::now() + FORCE_CLOSE_GRACE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub async fn run(self) -> WatchdogReport {
        let Self {
            name,
            mut processes,
            deadline,
        } = self;
        let mut report = WatchdogReport::default();
        let mut failed_polls = 0u32;

        loop {
            processes.retain(|process| {
                if process.is_alive() {
                    return true;
                }
                report.exited.push(process.pid());
                false
            });
            if processes.is_empty() {
                break;
            }

            if Instant::now() >= deadline {
                processes.retain(|process| {
                    let pid = process.pid();
                    if process.terminate() {
                        info!("[{}] force closed process {}", name, pid);
                        report.terminated.push(pid);
                        false
                    } else {
                        debug!("[{}] failed to terminate process {}, retrying", name, pid);
                        true
                    }
                });
                if processes.is_empty() {
                    break;
                }
                if failed_polls % WARN_EVERY == 0 {
                    let pids: Vec<u32> = processes.iter().map(|p| p.pid()).collect();
                    warn!("[{}] process(es) {:?} survive termination", name, pids);
                }
                failed_polls += 1;
            }

            sleep(POLL_INTERVAL).await;
        }

        debug!("[{}] watchdog finished: {:?}", name, report);
        report
    }
}
