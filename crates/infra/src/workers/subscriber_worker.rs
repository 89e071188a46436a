use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use shopkit_events::{Message, PubSub};

/// Pause after a failed subscribe before trying again.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Counters maintained by a running worker.
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl WorkerStats {
    /// Messages handled successfully (and committed).
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Messages the handler rejected (left uncommitted).
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Handle to control and join a background worker.
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    close: Option<Box<dyn FnOnce() + Send>>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl core::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl WorkerHandle {
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Request shutdown, close the channel to wake a parked subscribe, and wait
    /// for the worker thread to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(close) = self.close.take() {
            close();
        }
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Subscriber worker loop.
///
/// - Pulls one message at a time with `subscribe_with_commit`
/// - Commits a message only when the handler succeeds
/// - Rejected messages stay uncommitted and may be redelivered
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct SubscriberWorker;

impl SubscriberWorker {
    /// Spawn a worker thread consuming `pubsub`.
    ///
    /// `handler` must be idempotent (at-least-once delivery).
    pub fn spawn<P, H, E>(name: &'static str, pubsub: Arc<P>, mut handler: H) -> io::Result<WorkerHandle>
    where
        P: PubSub + 'static,
        H: FnMut(&Message) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(WorkerStats::default());

        let join = {
            let pubsub = pubsub.clone();
            let stats = stats.clone();
            thread::Builder::new()
                .name(name.to_string())
                .spawn(move || worker_loop(name, &*pubsub, shutdown_rx, &stats, &mut handler))?
        };

        info!(worker = name, "subscriber worker started");
        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            close: Some(Box::new(move || pubsub.close())),
            join: Some(join),
            stats,
        })
    }
}

fn worker_loop<P, H, E>(
    name: &'static str,
    pubsub: &P,
    shutdown_rx: mpsc::Receiver<()>,
    stats: &WorkerStats,
    handler: &mut H,
) where
    P: PubSub,
    H: FnMut(&Message) -> Result<(), E>,
    E: core::fmt::Debug,
{
    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let mut commit = |msg: &Message| match handler(msg) {
            Ok(()) => {
                stats.processed.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(err) => {
                stats.failed.fetch_add(1, Ordering::SeqCst);
                warn!(worker = name, topic = %msg.topic, offset = %msg.offset, error = ?err, "subscriber handler failed");
                false
            }
        };

        match pubsub.subscribe_with_commit(&mut commit) {
            Ok(msg) => debug!(worker = name, topic = %msg.topic, offset = %msg.offset, "message handled"),
            Err(err) => match shutdown_rx.recv_timeout(RETRY_BACKOFF) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    error!(worker = name, error = %err, "subscribe failed; retrying");
                }
            },
        }
    }

    info!(worker = name, "subscriber worker stopped");
}
