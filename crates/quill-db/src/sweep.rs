use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::executor::Executor;

/// Shortest allowed autocompaction period.
pub(crate) const MIN_INTERVAL: Duration = Duration::from_secs(5);

pub(crate) struct AutocompactionHandle {
    shutdown: Arc<AtomicBool>,
    notify: Arc<(Mutex<()>, Condvar)>,
    handle: Option<thread::JoinHandle<()>>,
}

impl AutocompactionHandle {
    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.notify.1.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AutocompactionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the periodic compaction thread. Each tick submits a compaction
/// task onto the executor, so compactions interleave with client operations
/// instead of racing them.
pub(crate) fn spawn(executor: Arc<Executor>, interval: Duration) -> AutocompactionHandle {
    let interval = interval.max(MIN_INTERVAL);
    let shutdown = Arc::new(AtomicBool::new(false));
    let notify = Arc::new((Mutex::new(()), Condvar::new()));

    let tick_flag = Arc::clone(&shutdown);
    let tick_notify = Arc::clone(&notify);
    let handle = thread::spawn(move || {
        loop {
            let (lock, cvar) = &*tick_notify;
            let guard = match lock.lock() {
                Ok(guard) => guard,
                Err(_) => break,
            };
            let _ = cvar.wait_timeout(guard, interval);
            if tick_flag.load(Ordering::Relaxed) {
                break;
            }
            executor.submit(
                false,
                Box::new(|core| {
                    if let Err(e) = core.compact() {
                        warn!(error = %e, "autocompaction failed");
                    }
                }),
            );
        }
    });

    AutocompactionHandle {
        shutdown,
        notify,
        handle: Some(handle),
    }
}
