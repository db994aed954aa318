//! Background periodic task

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A thread running a closure at a fixed interval until stopped
pub struct Poller {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Spawn the thread
    ///
    /// The first run happens one interval after spawning.
    pub fn spawn<F>(interval: Duration, mut task: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("navigation-poller".into())
            .spawn(move || loop {
                thread::park_timeout(interval);
                if flag.load(Ordering::Acquire) {
                    break;
                }
                task();
            })?;
        Ok(Self { stop, handle })
    }

    /// Stop the thread and wait for it to finish
    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        self.handle.thread().unpark();
        if self.handle.join().is_err() {
            log::error!("Poller thread panicked");
        }
    }
}
