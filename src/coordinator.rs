/// Shutdown coordination between the initiating task and the sampler worker.
///
/// `pair()` hands out two halves. The worker owns the [`Release`] and consumes
/// it on entering `Terminated`; the initiating task owns the [`Coordinator`] and
/// consumes it in [`Coordinator::wait`]. Both are single-use by construction.
use tokio::sync::oneshot;

/// Errors surfaced while waiting on the worker.
#[derive(Debug)]
pub enum CoordinatorError {
    /// The worker went away without releasing (it panicked or was aborted).
    WorkerLost,
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorError::WorkerLost => {
                write!(f, "sampler worker exited without signalling completion")
            }
        }
    }
}

impl std::error::Error for CoordinatorError {}

/// Waiting half, held by the initiating task.
#[derive(Debug)]
pub struct Coordinator {
    rx: oneshot::Receiver<()>,
}

/// Releasing half, held by the worker.
#[derive(Debug)]
pub struct Release {
    tx: oneshot::Sender<()>,
}

pub fn pair() -> (Coordinator, Release) {
    let (tx, rx) = oneshot::channel();
    (Coordinator { rx }, Release { tx })
}

impl Coordinator {
    /// Block until the worker has fully terminated.
    ///
    /// Returns `WorkerLost` instead of hanging forever if the release half is
    /// dropped unused.
    pub async fn wait(self) -> Result<(), CoordinatorError> {
        self.rx.await.map_err(|_| CoordinatorError::WorkerLost)
    }
}

impl Release {
    pub fn release(self) {
        // The waiter may already be gone during process teardown.
        let _ = self.tx.send(());
        tracing::debug!("coordinator released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_release() {
        let (coordinator, release) = pair();
        release.release();
        assert!(coordinator.wait().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_blocks_until_release() {
        let (coordinator, release) = pair();
        let start = tokio::time::Instant::now();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            release.release();
        });

        coordinator.wait().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_dropped_release_reports_worker_lost() {
        let (coordinator, release) = pair();
        drop(release);
        assert!(matches!(
            coordinator.wait().await,
            Err(CoordinatorError::WorkerLost)
        ));
    }

    #[tokio::test]
    async fn test_panicking_worker_does_not_hang_waiter() {
        let (coordinator, release) = pair();
        let handle = tokio::spawn(async move {
            let _release = release;
            panic!("worker blew up");
        });
        assert!(handle.await.is_err());
        assert!(matches!(
            coordinator.wait().await,
            Err(CoordinatorError::WorkerLost)
        ));
    }
}
