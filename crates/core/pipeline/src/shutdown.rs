//! Cooperative shutdown.
//!
//! The first SIGINT or SIGTERM requests a shutdown: work stops at the next lifecycle step
//! boundary and the worker records its final state. A second signal exits the process
//! immediately, leaving the current genome owned.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::InterruptError;

/// Exit code used when a second termination signal forces an immediate exit
pub const FORCED_EXIT_CODE: i32 = 130;

/// Shutdown flag shared by the worker loop, the driver and the signal task
///
/// Clones refer to the same flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a cooperative shutdown
    pub fn request(&self) {
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Safe point check: fails with [`InterruptError`] once a shutdown was requested
    pub fn check(&self) -> Result<(), InterruptError> {
        if self.is_requested() {
            Err(InterruptError)
        } else {
            Ok(())
        }
    }

    /// Spawns a task turning termination signals into shutdown requests
    ///
    /// Must be called within a tokio runtime.
    pub fn install_signal_handler(&self) -> std::io::Result<JoinHandle<()>> {
        let mut signals = TerminationSignals::new()?;
        let shutdown = self.clone();
        Ok(tokio::spawn(async move {
            let signal = signals.recv().await;
            tracing::warn!(
                signal,
                "shutdown requested, stopping at the next safe point (repeat to exit immediately)"
            );
            shutdown.request();

            let signal = signals.recv().await;
            tracing::error!(signal, "second shutdown signal, exiting immediately");
            std::process::exit(FORCED_EXIT_CODE);
        }))
    }
}

struct TerminationSignals {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    #[cfg(unix)]
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    fn new() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for the next signal and returns its name
    #[cfg(unix)]
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "CTRL-C",
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for Ctrl+C");
                std::future::pending().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_passes_until_requested() {
        let shutdown = Shutdown::new();
        assert_eq!(shutdown.check(), Ok(()));

        shutdown.request();

        assert_eq!(shutdown.check(), Err(InterruptError));
    }

    #[test]
    fn clones_share_the_flag() {
        let shutdown = Shutdown::new();
        let clone = shutdown.clone();

        clone.request();

        assert!(shutdown.is_requested());
    }
}
