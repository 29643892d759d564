//! MIDI-like events: what comes in (beat-stamped) and what goes out
//! (sample-stamped).

/// External track identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub u32);

/// Status nibble for note-off.
pub const NOTE_OFF: u8 = 0x80;
/// Status nibble for note-on.
pub const NOTE_ON: u8 = 0x90;
/// Status nibble for control change.
pub const CONTROL_CHANGE: u8 = 0xB0;
/// Channel-mode controller: All Notes Off.
pub const ALL_NOTES_OFF: u8 = 123;

/// A beat-stamped event loaded from note/region data. Read-only once loaded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledMidiEvent {
    pub beat: f64,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    pub track: TrackId,
}

/// How the scheduler treats an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiKind {
    NoteOn { channel: u8, pitch: u8 },
    /// Note-off, or note-on with velocity 0.
    NoteOff { channel: u8, pitch: u8 },
    Other,
}

impl ScheduledMidiEvent {
    pub fn new(beat: f64, status: u8, data1: u8, data2: u8, track: TrackId) -> Self {
        Self {
            beat,
            status,
            data1,
            data2,
            track,
        }
    }

    /// Note-on helper (`channel` is 0-15).
    pub fn note_on(beat: f64, track: TrackId, channel: u8, pitch: u8, velocity: u8) -> Self {
        Self::new(beat, NOTE_ON | (channel & 0x0F), pitch, velocity, track)
    }

    /// Note-off helper (`channel` is 0-15).
    pub fn note_off(beat: f64, track: TrackId, channel: u8, pitch: u8) -> Self {
        Self::new(beat, NOTE_OFF | (channel & 0x0F), pitch, 0, track)
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    #[inline]
    pub fn kind(&self) -> MidiKind {
        let channel = self.channel();
        let pitch = self.data1;
        match self.status & 0xF0 {
            NOTE_ON if self.data2 > 0 => MidiKind::NoteOn { channel, pitch },
            NOTE_ON | NOTE_OFF => MidiKind::NoteOff { channel, pitch },
            _ => MidiKind::Other,
        }
    }
}

/// A message handed to the dispatch sink: `(status, data1, data2, track, sample_time)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutgoingMidi {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    pub track: TrackId,
    /// Absolute hardware sample time, or `IMMEDIATE`.
    pub sample_time: u64,
}

impl OutgoingMidi {
    pub fn from_event(event: &ScheduledMidiEvent, sample_time: u64) -> Self {
        Self {
            status: event.status,
            data1: event.data1,
            data2: event.data2,
            track: event.track,
            sample_time,
        }
    }

    pub fn note_off(track: TrackId, channel: u8, pitch: u8, sample_time: u64) -> Self {
        Self {
            status: NOTE_OFF | (channel & 0x0F),
            data1: pitch,
            data2: 0,
            track,
            sample_time,
        }
    }

    pub fn all_notes_off(track: TrackId, channel: u8, sample_time: u64) -> Self {
        Self {
            status: CONTROL_CHANGE | (channel & 0x0F),
            data1: ALL_NOTES_OFF,
            data2: 0,
            track,
            sample_time,
        }
    }

    /// True for 0x9n messages with non-zero velocity.
    pub fn is_note_on(&self) -> bool {
        self.status & 0xF0 == NOTE_ON && self.data2 > 0
    }

    /// True for 0x8n messages and 0x9n messages with zero velocity.
    pub fn is_note_off(&self) -> bool {
        match self.status & 0xF0 {
            NOTE_OFF => true,
            NOTE_ON => self.data2 == 0,
            _ => false,
        }
    }

    pub fn is_all_notes_off(&self) -> bool {
        self.status & 0xF0 == CONTROL_CHANGE && self.data1 == ALL_NOTES_OFF
    }
}
