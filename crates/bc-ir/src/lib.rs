//! Core types for the beatclock scheduler.
//!
//! Musical-to-sample time conversion, the event types that flow into and
//! out of the MIDI scheduler, automation lanes, loop ranges, the audio
//! graph model, and the clock/beat provider traits every component is
//! constructed with.

mod automation;
mod clock;
mod context;
mod cycle;
mod event;
mod graph;
mod region;
mod timing_reference;

pub use automation::{
    interpolate, AutomationLane, AutomationPoint, AutomationSet, CurveKind, LaneError, TrackParam,
};
pub use clock::{BeatSource, Clock, ManualBeat, ManualClock, SampleClock};
pub use context::{
    clamp_sample_rate, clamp_tempo, SchedulingContext, TimeSignature, MAX_SAMPLE_RATE, MAX_TEMPO,
    MIN_SAMPLE_RATE, MIN_TEMPO,
};
pub use cycle::CycleConfig;
pub use event::{
    MidiKind, OutgoingMidi, ScheduledMidiEvent, TrackId, ALL_NOTES_OFF, CONTROL_CHANGE, NOTE_OFF,
    NOTE_ON,
};
pub use graph::{AudioGraph, Connection, Node, NodeKey, NodeType};
pub use region::{AudioRegion, FileRef};
pub use timing_reference::{TimingReference, DEFAULT_STALE_AFTER, IMMEDIATE};
