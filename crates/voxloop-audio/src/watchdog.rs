use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Logs a capture stall when the device callback stops feeding it.
///
/// The stall is reported once per dry spell; a subsequent feed re-arms the
/// trigger. Underruns are an acceptable degradation, never fatal, so the
/// watchdog only observes and logs.
#[derive(Clone)]
pub struct WatchdogTimer {
    timeout: Duration,
    last_feed: Arc<RwLock<Option<Instant>>>,
    triggered: Arc<AtomicBool>,
    handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl WatchdogTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_feed: Arc::new(RwLock::new(None)),
            triggered: Arc::new(AtomicBool::new(false)),
            handle: Arc::new(RwLock::new(None)),
        }
    }

    pub fn start(&mut self, running: Arc<AtomicBool>) {
        let timeout = self.timeout;
        let last_feed = Arc::clone(&self.last_feed);
        let triggered = Arc::clone(&self.triggered);

        *last_feed.write() = Some(Instant::now());

        let handle = thread::Builder::new()
            .name("capture-watchdog".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(250));

                    let elapsed = {
                        let guard = last_feed.read();
                        guard.map(|t| t.elapsed())
                    };
                    if let Some(elapsed) = elapsed {
                        if elapsed > timeout && !triggered.load(Ordering::SeqCst) {
                            tracing::error!("no audio data for {:?}, capture stalled", elapsed);
                            triggered.store(true, Ordering::SeqCst);
                        }
                    }
                }
            })
            .expect("spawn watchdog thread");

        *self.handle.write() = Some(handle);
    }

    pub fn feed(&self) {
        *self.last_feed.write() = Some(Instant::now());
        self.triggered.store(false, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Joins the watchdog thread; the shared running flag must already be
    /// cleared or this blocks.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.write().take() {
            let _ = handle.join();
        }
        self.triggered.store(false, Ordering::SeqCst);
        *self.last_feed.write() = None;
    }
}
