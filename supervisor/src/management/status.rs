use mcsl_protocol::management::instance::ServerStatus;
use std::time::Duration;

/// Derives the server status from what was observed in one pass.
///
/// `runtimes` are the elapsed runtimes of the alive matching processes and
/// `network_ready` the outcome of the single status probe. Runtimes are
/// compared in whole seconds, a process that has run for exactly
/// `max_start_duration` is still starting.
pub fn reconcile<R>(runtimes: R, network_ready: bool, max_start_duration: Duration) -> ServerStatus
where
    R: IntoIterator<Item = Duration>,
{
    let mut runtimes = runtimes.into_iter().peekable();
    if runtimes.peek().is_none() {
        return ServerStatus::Offline;
    }
    if network_ready {
        return ServerStatus::Online;
    }

    let limit = max_start_duration.as_secs();
    if runtimes.any(|elapsed| elapsed.as_secs() > limit) {
        ServerStatus::Anomaly
    } else {
        ServerStatus::Starting
    }
}
