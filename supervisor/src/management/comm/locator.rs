use super::process::{ProcessFilter, ProcessHandle, ProcessLocator};
use super::process_helper::ProcessHelper;
use log::{debug, warn};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

/// Finds server processes in the live process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoLocator;

impl ProcessLocator for SysinfoLocator {
    fn find(&self, filter: &ProcessFilter) -> Vec<Arc<dyn ProcessHandle>> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cwd(UpdateKind::Always),
        );

        let mut matched: Vec<(u64, u32)> = system
            .processes()
            .values()
            .filter(|p| is_live_status(p.status()))
            .filter(|p| filter.matches(&p.name().to_string_lossy(), p.exe(), p.cwd()))
            .map(|p| (p.start_time(), p.pid().as_u32()))
            .collect();
        // process table iteration order is arbitrary
        matched.sort_unstable();
        debug!("found {} process(es) matching {:?}", matched.len(), filter);

        matched
            .into_iter()
            .map(|(start_time, pid)| {
                Arc::new(SystemProcess { pid, start_time }) as Arc<dyn ProcessHandle>
            })
            .collect()
    }
}

fn is_live_status(status: ProcessStatus) -> bool {
    !matches!(status, ProcessStatus::Zombie | ProcessStatus::Dead)
}

/// Process table entry, identified by pid and start time so a recycled pid
/// is never mistaken for the original process.
#[derive(Debug, Clone)]
pub struct SystemProcess {
    pid: u32,
    start_time: u64,
}

impl SystemProcess {
    fn refresh(&self) -> Option<(ProcessStatus, u64, u64)> {
        let pid = Pid::from_u32(self.pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
        system
            .process(pid)
            .map(|p| (p.status(), p.start_time(), p.run_time()))
            .filter(|(_, start_time, _)| *start_time == self.start_time)
    }
}

impl ProcessHandle for SystemProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_alive(&self) -> bool {
        self.refresh()
            .is_some_and(|(status, _, _)| is_live_status(status))
    }

    fn elapsed(&self) -> Duration {
        self.refresh()
            .map(|(_, _, run_time)| Duration::from_secs(run_time))
            .unwrap_or_default()
    }

    fn terminate(&self) -> bool {
        if !self.is_alive() {
            return true;
        }
        match ProcessHelper::kill(self.pid) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!("could not kill process (pid={}): {}", self.pid, e);
                false
            }
        }
    }
}
