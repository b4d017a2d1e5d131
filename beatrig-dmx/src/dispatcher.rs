//! Fixed-rate DMX frame dispatcher
//!
//! The rig and the stored universe live behind locks shared by a cloneable
//! [`DmxHandle`]. Any thread may change fixtures and recompute the universe;
//! one sender thread transmits it at a fixed rate, skipping unchanged frames.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::port::{DmxPort, FrameSender, NullPort, SerialDmxPort};
use crate::rig::Rig;
use crate::universe::Universe;
use crate::update::ChannelUpdate;

/// Frame rate used by the venue controller
pub const DEFAULT_FPS: u32 = 44;

/// Hook run on the sender thread right before each frame is taken
pub type PreSend = Box<dyn FnMut(&DmxHandle) + Send>;

struct Shared {
    rig: Mutex<Rig>,
    frame: Mutex<Universe>,
    frames_sent: AtomicU64,
    send_errors: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Cloneable access to the rig and the stored universe
#[derive(Clone)]
pub struct DmxHandle {
    shared: Arc<Shared>,
}

impl DmxHandle {
    fn new(rig: Rig) -> Self {
        let frame = rig.frame();
        Self {
            shared: Arc::new(Shared {
                rig: Mutex::new(rig),
                frame: Mutex::new(frame),
                frames_sent: AtomicU64::new(0),
                send_errors: AtomicU64::new(0),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Run `f` with the rig locked. Call [`update`](Self::update) afterwards
    /// to publish the change.
    pub fn with_rig<R>(&self, f: impl FnOnce(&mut Rig) -> R) -> R {
        f(&mut self.shared.rig.lock())
    }

    /// Apply an update to a group and publish the new universe
    pub fn apply(&self, group: &str, update: &ChannelUpdate) -> usize {
        let touched = self.with_rig(|rig| rig.apply(group, update));
        self.update();
        touched
    }

    /// Recompute the stored universe from all fixtures.
    ///
    /// The rig stays locked until the frame is stored, so concurrent updates
    /// are stored in the order their rig states were taken.
    pub fn update(&self) {
        let rig = self.shared.rig.lock();
        *self.shared.frame.lock() = rig.frame();
    }

    /// Reset every fixture and publish the dark universe
    pub fn reset(&self) {
        self.with_rig(Rig::reset);
        self.update();
    }

    /// Snapshot of the stored universe
    pub fn frame(&self) -> Universe {
        self.shared.frame.lock().clone()
    }

    /// Frames put on the wire so far
    pub fn frames_sent(&self) -> u64 {
        self.shared.frames_sent.load(Ordering::Relaxed)
    }

    pub fn send_errors(&self) -> u64 {
        self.shared.send_errors.load(Ordering::Relaxed)
    }

    /// Last port problem, if any
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    fn set_error(&self, error: Option<String>) {
        *self.shared.last_error.lock() = error;
    }
}

/// Owns the sender thread
pub struct DmxDispatcher {
    handle: DmxHandle,
    interval: Duration,
    sender: Option<FrameSender>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DmxDispatcher {
    /// Dispatcher writing to `port` at `fps` frames per second
    pub fn new(rig: Rig, port: Box<dyn DmxPort>, fps: u32) -> Self {
        Self {
            handle: DmxHandle::new(rig),
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            sender: Some(FrameSender::new(port)),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Dispatcher on a serial device.
    ///
    /// If the device cannot be opened the error is recorded (see
    /// [`DmxHandle::last_error`]) and frames go to a [`NullPort`].
    pub fn open(rig: Rig, serial_path: &str, fps: u32) -> Self {
        match SerialDmxPort::open(serial_path) {
            Ok(port) => Self::new(rig, Box::new(port), fps),
            Err(e) => {
                let message = format!("{serial_path} not available: {e}");
                tracing::warn!(%message, "running without DMX output");
                let dispatcher = Self::new(rig, Box::new(NullPort), fps);
                dispatcher.handle.set_error(Some(message));
                dispatcher
            }
        }
    }

    pub fn handle(&self) -> DmxHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the sender thread. Does nothing if it already ran.
    pub fn start(&mut self, mut pre_send: Option<PreSend>) {
        let Some(mut sender) = self.sender.take() else {
            return;
        };
        self.running.store(true, Ordering::SeqCst);

        let handle = self.handle.clone();
        let running = self.running.clone();
        let interval = self.interval;
        tracing::info!(
            port = sender.port_name(),
            fps = (1.0 / interval.as_secs_f64()).round(),
            "DMX sender started"
        );

        let spawned = thread::Builder::new()
            .name("dmx-sender".to_string())
            .spawn(move || {
                let mut failing = false;
                let mut hook_failing = false;
                while running.load(Ordering::Relaxed) {
                    let tick = Instant::now();

                    if let Some(hook) = pre_send.as_mut() {
                        let ok = panic::catch_unwind(AssertUnwindSafe(|| hook(&handle))).is_ok();
                        if !ok && !hook_failing {
                            tracing::error!("pre-send hook panicked, still sending frames");
                            handle.set_error(Some("pre-send hook panicked".to_string()));
                        } else if ok && hook_failing {
                            tracing::info!("pre-send hook recovered");
                        }
                        hook_failing = !ok;
                    }

                    let frame = handle.frame();
                    match sender.send(&frame) {
                        Ok(true) => {
                            handle.shared.frames_sent.fetch_add(1, Ordering::Relaxed);
                            if failing {
                                failing = false;
                                handle.set_error(None);
                                tracing::info!("DMX output recovered");
                            }
                        }
                        Ok(false) => {}
                        Err(e) => {
                            handle.shared.send_errors.fetch_add(1, Ordering::Relaxed);
                            if !failing {
                                failing = true;
                                tracing::warn!(error = %e, "DMX transmit failed");
                            }
                            handle.set_error(Some(e.to_string()));
                        }
                    }

                    if let Some(rest) = interval.checked_sub(tick.elapsed()) {
                        thread::sleep(rest);
                    }
                }
                tracing::info!(frames = sender.sent(), "DMX sender stopped");
            });

        match spawned {
            Ok(thread) => self.thread = Some(thread),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                tracing::error!(error = %e, "failed to spawn DMX sender thread");
                self.handle.set_error(Some(e.to_string()));
            }
        }
    }

    /// Stop the sender thread and wait for it to exit
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DmxDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
