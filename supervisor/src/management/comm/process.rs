use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Recognises the processes that belong to one server instance: an
/// executable name fragment plus the working directory they run in.
#[derive(Debug, Clone)]
pub struct ProcessFilter {
    pub name: String,
    pub working_directory: PathBuf,
}

impl ProcessFilter {
    pub fn new(name: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            working_directory: working_directory.into(),
        }
    }

    pub fn matches(&self, name: &str, exe: Option<&Path>, cwd: Option<&Path>) -> bool {
        let fragment = self.name.to_lowercase();
        let name_matches = name.to_lowercase().contains(&fragment)
            || exe
                .and_then(Path::file_name)
                .map(|f| f.to_string_lossy().to_lowercase().contains(&fragment))
                .unwrap_or(false);

        name_matches && cwd.is_some_and(|cwd| self.is_working_directory(cwd))
    }

    fn is_working_directory(&self, cwd: &Path) -> bool {
        if cwd == self.working_directory {
            return true;
        }
        // the filter holds a canonical path, the OS may not
        std::fs::canonicalize(cwd)
            .map(|cwd| cwd == self.working_directory)
            .unwrap_or(false)
    }
}

/// One OS process matched by a [`ProcessLocator`].
pub trait ProcessHandle: Send + Sync {
    fn pid(&self) -> u32;

    fn is_alive(&self) -> bool;

    /// Time since the process was started.
    fn elapsed(&self) -> Duration;

    /// Kills the process without a grace period. Returns `true` when the
    /// process is gone afterwards, including when it had already exited.
    fn terminate(&self) -> bool;
}

pub trait ProcessLocator: Send + Sync {
    /// Matching processes, oldest first.
    fn find(&self, filter: &ProcessFilter) -> Vec<Arc<dyn ProcessHandle>>;
}
