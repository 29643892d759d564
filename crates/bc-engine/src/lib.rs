//! Scheduling engine for beatclock.
//!
//! Turns beat-stamped MIDI events into sample-accurate output through a
//! lookahead scheduler, keeps audio regions, the metronome and MIDI on one
//! timing reference across loop jumps, smooths mixer parameters off the
//! render thread, and watches the audio graph for breakage.

pub mod active_notes;
pub mod config;
pub mod dispatch;
mod event_queue;
pub mod health;
mod latency;
pub mod metronome;
pub mod playback;
pub mod realization;
pub mod scheduler;
pub mod sink;
pub mod smoothing;
mod timing;

pub use active_notes::{ActiveNoteKey, ActiveNoteRegistry, NoteState, MAX_ACTIVE_NOTES};
pub use config::{EngineConfig, HealthConfig, SchedulerConfig, SmoothingConfig};
pub use dispatch::{DispatchQueue, DISPATCH_CAPACITY};
pub use event_queue::EventQueue;
pub use health::{GraphHealth, HealthIssue, HealthMonitor, HealthSignal};
pub use latency::LatencyRegistry;
pub use metronome::{Click, ClickKind, Metronome};
pub use playback::{PlaybackCoordinator, PlayerNode, ScheduledSegment, SegmentPlayer};
pub use realization::{PluginSlot, RealizationError, RealizationState};
pub use scheduler::{MidiScheduler, SchedulerStats, TransportState};
pub use sink::{MidiSink, RingSink, SinkItem, VecSink};
pub use smoothing::{MixerControls, SmoothingEngine, TrackOutputs};
pub use timing::{SharedTiming, TimingSnapshot};
