use crate::config::LaunchCommand;
use crate::error::LaunchError;
use log::info;
use mcsl_protocol::management::instance::TargetType;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

#[cfg(windows)]
const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;

/// Starts a detached server process. Returns its pid.
pub trait Launcher: Send + Sync {
    fn launch(&self, command: &LaunchCommand, working_dir: &Path) -> Result<u32, LaunchError>;
}

/// Windows: runs the server in its own console window, scripts through
/// `cmd /c`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLauncher;

/// POSIX: executes the target directly in a new process group, detached
/// from the supervisor's stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectLauncher;

pub fn default_launcher() -> Arc<dyn Launcher> {
    if cfg!(windows) {
        Arc::new(ConsoleLauncher)
    } else {
        Arc::new(DirectLauncher)
    }
}

impl Launcher for ConsoleLauncher {
    fn launch(&self, command: &LaunchCommand, working_dir: &Path) -> Result<u32, LaunchError> {
        check_target(command)?;
        let mut cmd = match command.target_type {
            TargetType::Script => {
                let mut cmd = Command::new("cmd");
                cmd.arg("/c").arg(&command.program);
                cmd
            }
            TargetType::Jar | TargetType::Executable => Command::new(&command.program),
        };
        cmd.args(&command.args).current_dir(working_dir);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NEW_CONSOLE);
        spawn(&mut cmd, &command.program)
    }
}

impl Launcher for DirectLauncher {
    fn launch(&self, command: &LaunchCommand, working_dir: &Path) -> Result<u32, LaunchError> {
        check_target(command)?;
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        cmd.process_group(0);
        spawn(&mut cmd, &command.program)
    }
}

fn check_target(command: &LaunchCommand) -> Result<(), LaunchError> {
    if command.target.is_file() {
        Ok(())
    } else {
        Err(LaunchError::MissingTarget(command.target.clone()))
    }
}

// the child handle is dropped right away, tokio reaps it once it exits
fn spawn(cmd: &mut Command, program: &str) -> Result<u32, LaunchError> {
    let child = cmd.kill_on_drop(false).spawn().map_err(|source| LaunchError::Spawn {
        program: program.to_owned(),
        source,
    })?;
    let pid = child.id().unwrap_or(0);
    info!("launched {} (pid={})", program, pid);
    Ok(pid)
}
