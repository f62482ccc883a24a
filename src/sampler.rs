/// The sampler worker: one long-running task that turns scheduler ticks into
/// lines on an output sink until it is cancelled.
use crate::coordinator::Release;
use crate::scheduler::Scheduler;
use std::fmt;
use std::io::Write;
use tokio_util::sync::CancellationToken;

/// Written once when the worker accepts cancellation.
pub const SHUTDOWN_NOTICE: &str = "Received interrupt signal, shutting down...";
/// Printed by the initiating task before it blocks on the worker.
pub const WAITING_NOTICE: &str = "Waiting for goroutine to finish...";
/// Printed by the initiating task after the worker has terminated.
pub const FINISHED_NOTICE: &str = "Goroutine finished";

/// Something the worker can snapshot on every tick.
pub trait Probe {
    type Sample: fmt::Display;

    fn sample(&mut self) -> Self::Sample;
}

/// Probe with nothing to measure; each sample is just the fact of the tick.
#[derive(Debug, Default)]
pub struct TickProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick;

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("tick")
    }
}

impl Probe for TickProbe {
    type Sample = Tick;

    fn sample(&mut self) -> Tick {
        Tick
    }
}

/// Worker lifecycle. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Initialized,
    Running,
    Stopping,
    Terminated,
}

pub struct Worker<P, W> {
    probe: P,
    sink: W,
    state: WorkerState,
    samples: u64,
}

impl<P, W> Worker<P, W>
where
    P: Probe,
    W: Write,
{
    pub fn new(probe: P, sink: W) -> Self {
        Self {
            probe,
            sink,
            state: WorkerState::Initialized,
            samples: 0,
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run until `cancel` fires, then write the shutdown notice and release
    /// the coordinator. Returns the sink.
    ///
    /// Cancellation is checked first on every wakeup, so once it has been
    /// observed no pending tick is ever sampled.
    pub async fn run(
        mut self,
        mut scheduler: Scheduler,
        cancel: CancellationToken,
        release: Release,
    ) -> W {
        self.transition(WorkerState::Running);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = scheduler.tick() => self.emit(),
            }
        }

        self.transition(WorkerState::Stopping);
        drop(scheduler);
        self.write_line(SHUTDOWN_NOTICE);

        self.transition(WorkerState::Terminated);
        tracing::info!(samples = self.samples, "sampler worker terminated");
        release.release();
        self.sink
    }

    fn emit(&mut self) {
        let sample = self.probe.sample();
        self.samples += 1;
        tracing::debug!(sample = self.samples, "tick");
        self.write_line(sample);
    }

    fn write_line(&mut self, line: impl fmt::Display) {
        let result = writeln!(self.sink, "{line}").and_then(|_| self.sink.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to write to output sink");
        }
    }

    fn transition(&mut self, next: WorkerState) {
        tracing::debug!(from = ?self.state, to = ?next, "worker state change");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator;
    use crate::scheduler::Interval;
    use std::time::Duration;
    use tokio::time::{self, Instant};

    /// Emits the whole seconds elapsed since the probe was created.
    struct ElapsedProbe {
        start: Instant,
    }

    impl ElapsedProbe {
        fn new() -> Self {
            Self {
                start: Instant::now(),
            }
        }
    }

    impl Probe for ElapsedProbe {
        type Sample = u64;

        fn sample(&mut self) -> u64 {
            self.start.elapsed().as_secs()
        }
    }

    fn lines(sink: Vec<u8>) -> Vec<String> {
        String::from_utf8(sink)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Start a worker, cancel it after `run_for`, and collect its output.
    async fn run_worker<P>(probe: P, interval_secs: u64, run_for: Duration) -> Vec<String>
    where
        P: Probe + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (coordinator, release) = coordinator::pair();
        let scheduler = Scheduler::start(Interval::from_secs(interval_secs).unwrap());
        let handle = tokio::spawn(Worker::new(probe, Vec::new()).run(
            scheduler,
            cancel.clone(),
            release,
        ));

        time::sleep(run_for).await;
        cancel.cancel();

        coordinator.wait().await.unwrap();
        lines(handle.await.unwrap())
    }

    #[test]
    fn test_tick_sample_format() {
        assert_eq!(TickProbe.sample().to_string(), "tick");
    }

    #[test]
    fn test_new_worker_is_initialized() {
        let worker = Worker::new(TickProbe, Vec::new());
        assert_eq!(worker.state(), WorkerState::Initialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_two_for_five_seconds() {
        let out = run_worker(ElapsedProbe::new(), 2, Duration::from_secs(5)).await;
        assert_eq!(out, vec!["2", "4", SHUTDOWN_NOTICE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_count_is_floor_of_elapsed_over_interval() {
        for (interval, secs, expected) in [(1, 3, 3usize), (3, 10, 3), (4, 3, 0)] {
            let out = run_worker(
                TickProbe,
                interval,
                Duration::from_secs(secs) + Duration::from_millis(500),
            )
            .await;
            let ticks = out.iter().filter(|l| *l == "tick").count();
            assert_eq!(ticks, expected, "interval={interval} secs={secs}");
            assert_eq!(out.last().unwrap(), SHUTDOWN_NOTICE);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_before_first_tick() {
        let out = run_worker(TickProbe, 1, Duration::from_millis(500)).await;
        assert_eq!(out, vec![SHUTDOWN_NOTICE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_tick_dropped_after_cancel() {
        let cancel = CancellationToken::new();
        let (coordinator, release) = coordinator::pair();
        let scheduler = Scheduler::start(Interval::from_secs(1).unwrap());

        // Several ticks are due and cancellation is pending at the same time.
        time::advance(Duration::from_secs(3)).await;
        cancel.cancel();

        let sink = Worker::new(TickProbe, Vec::new())
            .run(scheduler, cancel, release)
            .await;
        coordinator.wait().await.unwrap();
        assert_eq!(lines(sink), vec![SHUTDOWN_NOTICE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_in_arrival_order_without_duplicates() {
        let out = run_worker(ElapsedProbe::new(), 1, Duration::from_millis(6500)).await;
        let (notice, samples) = out.split_last().unwrap();
        assert_eq!(notice, SHUTDOWN_NOTICE);

        let values: Vec<u64> = samples.iter().map(|l| l.parse().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_notice_written_once_and_release_once() {
        let cancel = CancellationToken::new();
        let (coordinator, release) = coordinator::pair();
        let scheduler = Scheduler::start(Interval::from_secs(1).unwrap());
        let handle = tokio::spawn(Worker::new(TickProbe, Vec::new()).run(
            scheduler,
            cancel.clone(),
            release,
        ));

        time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();
        cancel.cancel();

        coordinator.wait().await.unwrap();
        let out = lines(handle.await.unwrap());
        assert_eq!(out, vec!["tick", SHUTDOWN_NOTICE]);
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_errors_do_not_stop_worker() {
        let cancel = CancellationToken::new();
        let (coordinator, release) = coordinator::pair();
        let scheduler = Scheduler::start(Interval::from_secs(1).unwrap());
        let handle = tokio::spawn(Worker::new(TickProbe, FailingSink).run(
            scheduler,
            cancel.clone(),
            release,
        ));

        time::sleep(Duration::from_millis(2500)).await;
        cancel.cancel();

        coordinator.wait().await.unwrap();
        assert!(handle.await.is_ok());
    }
}
