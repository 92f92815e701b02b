/**
 * Inactivity Monitor
 *
 * One monitor runs per connection and closes it after a period of
 * application-level silence. The monitor is a single deadline, pushed forward
 * by `touch()` whenever the session accepts an inbound message. Nothing polls.
 *
 * # States
 *
 * ```text
 *   ACTIVE --touch()--> ACTIVE
 *   ACTIVE --deadline elapsed--> CLOSING --close + deregister--> CLOSED
 * ```
 *
 * `CLOSED` is terminal. When the connection is torn down by someone else (or
 * the monitor is stopped), the monitor releases its timer and reports
 * `CLOSED` without deregistering anything. A reconnecting user gets a fresh
 * monitor.
 *
 * Closing always goes through `ConnectionRegistry::deregister`, which checks
 * handle identity, so a monitor that fires late can never evict a newer
 * connection for the same user.
 */

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::connection::ConnectionHandle;
use super::registry::ConnectionRegistry;

/// Lifecycle state of a monitored connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Active,
    Closing,
    Closed,
}

/// Per-connection idle timer
pub struct InactivityMonitor {
    idle_timeout: Duration,
    deadline: watch::Sender<Instant>,
    state: watch::Receiver<MonitorState>,
    task: JoinHandle<()>,
}

impl InactivityMonitor {
    /// Start monitoring `handle`, in `Active` state with a deadline of
    /// `now + idle_timeout`
    pub fn spawn(
        handle: ConnectionHandle,
        registry: ConnectionRegistry,
        idle_timeout: Duration,
    ) -> Self {
        let (deadline, deadline_rx) = watch::channel(Instant::now() + idle_timeout);
        let (state_tx, state) = watch::channel(MonitorState::Active);
        let task = tokio::spawn(run(handle, registry, deadline_rx, state_tx));
        Self {
            idle_timeout,
            deadline,
            state,
            task,
        }
    }

    /// Record inbound activity, pushing the deadline to `now + idle_timeout`
    pub fn touch(&self) {
        self.deadline.send_replace(Instant::now() + self.idle_timeout);
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Stop the timer without closing the connection
    ///
    /// Used by the session during its own teardown.
    pub async fn stop(self) {
        let Self { deadline, task, .. } = self;
        drop(deadline);
        let _ = task.await;
    }
}

async fn run(
    handle: ConnectionHandle,
    registry: ConnectionRegistry,
    mut deadline_rx: watch::Receiver<Instant>,
    state: watch::Sender<MonitorState>,
) {
    let closed = handle.closed();
    tokio::pin!(closed);

    loop {
        let deadline = *deadline_rx.borrow_and_update();
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                match deadline_rx.has_changed() {
                    // A touch that raced the timer wins
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(_) => break,
                }
                state.send_replace(MonitorState::Closing);
                info!(
                    user_id = handle.user_id(),
                    connection_id = %handle.id(),
                    "closing connection due to inactivity"
                );
                registry.deregister(&handle).await;
                break;
            }
            changed = deadline_rx.changed() => {
                if changed.is_err() {
                    debug!(connection_id = %handle.id(), "inactivity monitor stopped");
                    break;
                }
            }
            _ = &mut closed => {
                debug!(connection_id = %handle.id(), "connection closed, releasing idle timer");
                break;
            }
        }
    }

    state.send_replace(MonitorState::Closed);
}

#[cfg(test)]
impl InactivityMonitor {
    fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.clone()
    }

    async fn wait_closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == MonitorState::Closed).await;
    }
}
