//! Pipeline-wide shutdown signal.

use std::sync::Arc;
use tokio::sync::watch;

/// Receiver side of the shutdown signal.
///
/// Holds `true` once shutdown was requested.
pub type ShutdownRx = watch::Receiver<bool>;

/// Sender side of the shutdown signal, cloned into every component that may stop the pipeline.
#[derive(Debug, Clone)]
pub struct ShutdownTx(Arc<watch::Sender<bool>>);

impl ShutdownTx {
    /// Requests shutdown. Receivers subscribed later still observe the request.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }
}

/// Outcome of an operation that can be interrupted by shutdown.
#[derive(Debug, PartialEq)]
pub enum ShutdownResult<T, I> {
    Ok(T),
    Shutdown(I),
}

impl<T, I> ShutdownResult<T, I> {
    pub fn should_shutdown(&self) -> bool {
        matches!(self, ShutdownResult::Shutdown(_))
    }
}

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(Arc::new(tx)), rx)
}

/// Returns whether shutdown was requested, without waiting.
pub fn is_shutdown_requested(shutdown_rx: &ShutdownRx) -> bool {
    *shutdown_rx.borrow()
}

/// Waits until shutdown is requested.
///
/// Returns immediately if it already was. Also returns when every sender is gone, since
/// nothing can request shutdown anymore.
pub async fn wait_for_shutdown(shutdown_rx: &mut ShutdownRx) {
    let _ = shutdown_rx.wait_for(|requested| *requested).await;
}
