/// Signal handling for graceful shutdown.
///
/// Handles SIGINT (Ctrl-C) and SIGTERM.
/// First signal: cancel the shutdown token so the worker stops after its current sample.
/// Any later signal: exit immediately or ignore it, per `shutdown.second_interrupt`.
use crate::config::SecondInterrupt;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Exit status for a forced, non-graceful exit (128 + SIGINT).
pub const FORCED_EXIT_CODE: i32 = 130;

/// Errors that can occur while installing signal handlers.
#[derive(Debug)]
pub enum SignalError {
    /// The OS refused the handler registration.
    Register {
        signal: &'static str,
        source: std::io::Error,
    },
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalError::Register { signal, source } => {
                write!(f, "failed to register {} handler: {}", signal, source)
            }
        }
    }
}

impl std::error::Error for SignalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SignalError::Register { source, .. } => Some(source),
        }
    }
}

/// What the listener does with a signal after the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatAction {
    Exit(i32),
    Ignore,
}

impl From<SecondInterrupt> for RepeatAction {
    fn from(policy: SecondInterrupt) -> Self {
        match policy {
            SecondInterrupt::Force => RepeatAction::Exit(FORCED_EXIT_CODE),
            SecondInterrupt::Ignore => RepeatAction::Ignore,
        }
    }
}

/// Registered SIGINT/SIGTERM streams, not yet listening.
///
/// Must be created inside a tokio runtime.
pub struct SignalListener {
    interrupt: Signal,
    terminate: Signal,
    on_repeat: RepeatAction,
}

impl SignalListener {
    /// Register both handlers. Failure here means shutdown cannot be graceful,
    /// so callers must not start the worker.
    pub fn install(policy: SecondInterrupt) -> Result<Self, SignalError> {
        let interrupt = signal(SignalKind::interrupt()).map_err(|e| SignalError::Register {
            signal: "SIGINT",
            source: e,
        })?;
        let terminate = signal(SignalKind::terminate()).map_err(|e| SignalError::Register {
            signal: "SIGTERM",
            source: e,
        })?;
        tracing::debug!(?policy, "signal handlers installed");
        Ok(Self {
            interrupt,
            terminate,
            on_repeat: policy.into(),
        })
    }

    /// Listen in the background, cancelling `token` on the first signal.
    ///
    /// A forced exit decided by [`listen`](Self::listen) terminates the process.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Some(code) = self.listen(token).await {
                std::process::exit(code);
            }
        })
    }

    /// Cancel `token` on the first signal, then apply the repeat policy.
    ///
    /// Returns the exit code once a repeated signal calls for a forced exit,
    /// or `None` if the signal streams close first.
    async fn listen(mut self, token: CancellationToken) -> Option<i32> {
        let name = self.next_signal().await?;
        tracing::info!(signal = name, "received shutdown signal, stopping worker");
        token.cancel();

        while let Some(name) = self.next_signal().await {
            match self.on_repeat {
                RepeatAction::Exit(code) => {
                    tracing::warn!(signal = name, code, "repeated shutdown signal, exiting now");
                    return Some(code);
                }
                RepeatAction::Ignore => {
                    tracing::info!(signal = name, "shutdown already in progress, ignoring signal");
                }
            }
        }
        None
    }

    /// Next delivered signal, or `None` once the runtime's driver is gone.
    async fn next_signal(&mut self) -> Option<&'static str> {
        tokio::select! {
            s = self.interrupt.recv() => s.map(|_| "SIGINT"),
            s = self.terminate.recv() => s.map(|_| "SIGTERM"),
        }
    }
}
