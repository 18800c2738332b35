//! Background orphan sweeper with automatic restart on panic.

use std::time::Duration;

use termlink_core::OrphanSweeper;
use tracing::{error, info};

const MAX_RESTARTS: u32 = 100;

/// Spawn the scheduled sweeper under a supervisor task.
///
/// The supervisor restarts the sweep loop if it panics and gives up after
/// `MAX_RESTARTS` restarts. Returns the supervisor's handle.
pub fn spawn_orphan_sweeper(
    sweeper: OrphanSweeper,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut restart_count = 0u32;

        loop {
            let result = tokio::spawn(sweeper.clone().run(period)).await;

            match result {
                Ok(()) => {
                    info!("Orphan sweeper exited normally");
                    break;
                }
                Err(e) if e.is_cancelled() => {
                    info!("Orphan sweeper cancelled");
                    break;
                }
                Err(e) => {
                    restart_count += 1;
                    error!(
                        error = ?e,
                        restart_count,
                        "Orphan sweeper panicked, restarting"
                    );
                    if restart_count > MAX_RESTARTS {
                        error!("Orphan sweeper restarted too many times, giving up");
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    })
}
