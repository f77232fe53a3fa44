use std::io;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::Pid;
#[cfg(windows)]
use winapi::shared::minwindef::FALSE;
#[cfg(windows)]
use winapi::shared::winerror::ERROR_INVALID_PARAMETER;
#[cfg(windows)]
use winapi::um::errhandlingapi::GetLastError;
#[cfg(windows)]
use winapi::um::handleapi::CloseHandle;
#[cfg(windows)]
use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
#[cfg(windows)]
use winapi::um::winnt::PROCESS_TERMINATE;

pub struct ProcessHelper;

impl ProcessHelper {
    /// Forcefully kills the process: SIGKILL on Unix, TerminateProcess on
    /// Windows. A process that no longer exists yields
    /// [`io::ErrorKind::NotFound`].
    pub fn kill(pid: u32) -> io::Result<()> {
        #[cfg(unix)]
        {
            let pid = Pid::from_raw(pid as i32);
            kill(pid, Signal::SIGKILL).map_err(|e| match e {
                Errno::ESRCH => io::Error::new(io::ErrorKind::NotFound, e),
                e => io::Error::new(io::ErrorKind::Other, e),
            })
        }
        #[cfg(windows)]
        {
            let handle = unsafe { OpenProcess(PROCESS_TERMINATE, FALSE, pid) };
            if handle.is_null() {
                // OpenProcess rejects pids that are not in use
                let code = unsafe { GetLastError() };
                return Err(if code == ERROR_INVALID_PARAMETER {
                    io::Error::new(io::ErrorKind::NotFound, format!("no process {}", pid))
                } else {
                    io::Error::from_raw_os_error(code as i32)
                });
            }
            let result = unsafe { TerminateProcess(handle, 1) };
            let error = io::Error::last_os_error();
            unsafe { CloseHandle(handle) };
            if result == 0 {
                Err(error)
            } else {
                Ok(())
            }
        }
    }
}
