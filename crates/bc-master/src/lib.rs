//! Headless controller for beatclock.
//!
//! A `Session` owns the scheduling state; a `Controller` shares it with
//! the scan, smoothing and health workers. The CLI and tests drive either
//! one directly.

mod config;
mod offline;
mod playhead;
mod session;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bc_audio::{AudioDevice, AudioError, CpalOutput, MidiCallback, MidiRenderer};
use bc_engine::{EngineConfig, GraphHealth, HealthSignal, MidiSink, MixerControls, RingSink};
use bc_ir::{CycleConfig, SampleClock, SchedulingContext, TrackId};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

pub use config::{load_config, parse_config, ConfigError};
pub use offline::{build_offline, run_offline, OfflineRig};
pub use playhead::Playhead;
pub use session::Session;

/// Scheduler-to-render ring capacity, in items.
pub const RING_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Runs a session's periodic work on background threads.
///
/// The session lock is only taken by control and worker threads; the
/// render callback talks to the scheduler through the ring alone.
pub struct Controller<S: MidiSink + 'static> {
    session: Arc<Mutex<Session<S>>>,
    playhead: Arc<Playhead>,
    health: HealthSignal,
    stop_signal: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl<S: MidiSink + 'static> Controller<S> {
    pub fn start(session: Session<S>) -> Result<Self, ControllerError> {
        let config = *session.config();
        let playhead = session.playhead().clone();
        let health = session.health_signal();
        let session = Arc::new(Mutex::new(session));
        let stop_signal = Arc::new(AtomicBool::new(false));

        let mut controller = Self {
            session,
            playhead,
            health,
            stop_signal,
            workers: Vec::with_capacity(3),
        };
        controller.spawn_worker("bc-scan", config.scheduler.scan_interval(), Session::scan)?;
        controller.spawn_worker(
            "bc-smoothing",
            config.smoothing.tick_interval(),
            Session::smoothing_tick,
        )?;
        controller.spawn_worker("bc-health", config.health.interval(), |s| {
            s.check_health();
        })?;
        info!(workers = controller.workers.len(), "controller started");
        Ok(controller)
    }

    fn spawn_worker(
        &mut self,
        name: &str,
        period: Duration,
        mut work: impl FnMut(&mut Session<S>) + Send + 'static,
    ) -> Result<(), ControllerError> {
        let session = self.session.clone();
        let stop = self.stop_signal.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let started = Instant::now();
                    {
                        let mut guard = session.lock();
                        work(&mut guard);
                    }
                    std::thread::sleep(period.saturating_sub(started.elapsed()));
                }
            })?;
        self.workers.push(handle);
        Ok(())
    }

    // --- Transport ---

    pub fn play(&self, from_beat: f64) {
        self.session.lock().play(from_beat);
    }

    pub fn stop(&self) {
        self.session.lock().stop();
    }

    pub fn seek(&self, to_beat: f64) {
        self.session.lock().seek(to_beat);
    }

    pub fn set_tempo(&self, tempo: f64) {
        self.session.lock().set_tempo(tempo);
    }

    pub fn set_sample_rate(&self, sample_rate: f64) {
        self.session.lock().set_sample_rate(sample_rate);
    }

    pub fn set_cycle(&self, cycle: CycleConfig) {
        self.session.lock().set_cycle(cycle);
    }

    pub fn set_controls(&self, track: TrackId, controls: MixerControls) -> bool {
        self.session.lock().set_controls(track, controls)
    }

    /// Run `f` with exclusive access to the session.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session<S>) -> R) -> R {
        f(&mut self.session.lock())
    }

    // --- State ---

    /// Current beat. Lock-free with respect to the session.
    pub fn position(&self) -> f64 {
        self.playhead.position()
    }

    pub fn is_playing(&self) -> bool {
        self.playhead.is_playing()
    }

    pub fn health(&self) -> GraphHealth {
        self.health.get()
    }

    /// Stop playback and join every worker.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.stop_signal.store(true, Ordering::Release);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        self.session.lock().stop();
        debug!("controller shut down");
    }
}

impl<S: MidiSink + 'static> Drop for Controller<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A controller driving the default hardware output.
pub struct LiveRig {
    pub controller: Controller<RingSink>,
    /// Keeps the stream alive.
    pub output: CpalOutput,
}

/// Open the default device and start a controller around it.
///
/// The session runs at the device's sample rate; `context` supplies tempo
/// and time signature. `on_midi` runs on the audio thread.
pub fn open_live(
    context: SchedulingContext,
    config: EngineConfig,
    setup: impl FnOnce(&mut Session<RingSink>),
    on_midi: MidiCallback,
) -> Result<LiveRig, ControllerError> {
    let mut output = CpalOutput::new()?;
    let clock = Arc::new(SampleClock::new());
    let (sink, consumer) = RingSink::new(RING_CAPACITY);
    let context = context.with_sample_rate(f64::from(output.sample_rate()));

    let mut session = Session::new(clock.clone(), context, config, sink);
    setup(&mut session);
    output.build_stream(MidiRenderer::new(consumer, clock, on_midi))?;
    session.set_device_latency(output.output_latency());

    let controller = Controller::start(session)?;
    Ok(LiveRig { controller, output })
}
