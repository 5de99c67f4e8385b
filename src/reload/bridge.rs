//! Handing work from foreign threads to the tokio scheduler.

use crate::error::{ReloadError, Result};
use arc_swap::ArcSwapOption;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A unit of work submitted through the bridge.
pub type BridgeTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Thread-safe entry point for scheduling futures from threads tokio does
/// not own, such as the file watcher's.
///
/// Submissions go through an unbounded channel whose only consumer is a
/// [`BridgeRunner`] running on the scheduler. Until [`attach`](Self::attach)
/// is called, and after [`detach`](Self::detach), submissions fail.
///
/// # Examples
///
/// ```rust
/// use hotswap_handlers::reload::SchedulerBridge;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let bridge = SchedulerBridge::new();
/// assert!(bridge.submit(async {}).is_err());
///
/// let runner = bridge.attach();
/// tokio::spawn(runner.run());
///
/// let (tx, rx) = tokio::sync::oneshot::channel();
/// std::thread::spawn({
///     let bridge = bridge.clone();
///     move || bridge.submit(async move { let _ = tx.send(7); })
/// })
/// .join()
/// .unwrap()
/// .unwrap();
/// assert_eq!(rx.await.unwrap(), 7);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct SchedulerBridge {
    slot: Arc<ArcSwapOption<mpsc::UnboundedSender<BridgeTask>>>,
}

impl SchedulerBridge {
    /// A detached bridge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh channel and return its consumer.
    ///
    /// Replaces any previously attached runner; that runner stops once
    /// its queued tasks are spawned.
    pub fn attach(&self) -> BridgeRunner {
        let (tx, rx) = mpsc::unbounded_channel();
        self.slot.store(Some(Arc::new(tx)));
        debug!("Scheduler bridge attached");
        BridgeRunner { rx }
    }

    /// Drop the sender; the runner finishes after spawning queued tasks.
    pub fn detach(&self) {
        if self.slot.swap(None).is_some() {
            debug!("Scheduler bridge detached");
        }
    }

    /// Whether a live runner is attached.
    pub fn is_attached(&self) -> bool {
        match &*self.slot.load() {
            Some(tx) => !tx.is_closed(),
            None => false,
        }
    }

    /// Hand `task` to the scheduler. Never blocks.
    ///
    /// # Errors
    ///
    /// [`ReloadError::BridgeUnavailable`] if no runner is attached or the
    /// runner has gone away; the task is dropped.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.slot.load();
        let Some(tx) = &*guard else {
            warn!("Bridge submission dropped: no scheduler attached");
            return Err(ReloadError::BridgeUnavailable);
        };

        tx.send(Box::pin(task)).map_err(|_| {
            warn!("Bridge submission dropped: scheduler runner stopped");
            ReloadError::BridgeUnavailable
        })
    }
}

impl std::fmt::Debug for SchedulerBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerBridge")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Sole consumer of a bridge channel; spawns each submitted task.
#[derive(Debug)]
pub struct BridgeRunner {
    rx: mpsc::UnboundedReceiver<BridgeTask>,
}

impl BridgeRunner {
    /// Spawn submitted tasks until the bridge is detached.
    pub async fn run(mut self) {
        while let Some(task) = self.rx.recv().await {
            tokio::spawn(task);
        }
        debug!("Scheduler bridge runner stopped");
    }
}
