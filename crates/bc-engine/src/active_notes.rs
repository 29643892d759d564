//! Registry of currently sounding notes.
//!
//! Fixed capacity, no heap. The scheduler is the only writer.

use bc_ir::{TrackId, IMMEDIATE};
use heapless::FnvIndexMap;

/// Maximum simultaneously tracked notes across all tracks.
pub const MAX_ACTIVE_NOTES: usize = 128;

/// Identity of a sounding note.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActiveNoteKey {
    pub track: TrackId,
    pub pitch: u8,
    pub channel: u8,
}

impl ActiveNoteKey {
    pub fn new(track: TrackId, channel: u8, pitch: u8) -> Self {
        Self {
            track,
            pitch,
            channel,
        }
    }
}

/// Lifecycle of a registry entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteState {
    /// Note-on emitted, no note-off yet.
    Held,
    /// Note-off emitted for this host time but not yet reached.
    Releasing { off_time: u64 },
}

/// At most one entry per `(track, pitch, channel)`.
#[derive(Debug, Default)]
pub struct ActiveNoteRegistry {
    notes: FnvIndexMap<ActiveNoteKey, NoteState, MAX_ACTIVE_NOTES>,
}

impl ActiveNoteRegistry {
    pub fn new() -> Self {
        Self {
            notes: FnvIndexMap::new(),
        }
    }

    /// Record a note-on. A retrigger overwrites the existing entry.
    ///
    /// Returns false if the registry is full.
    pub fn note_on(&mut self, key: ActiveNoteKey) -> bool {
        self.notes.insert(key, NoteState::Held).is_ok()
    }

    /// Record an emitted note-off at `host_time`.
    ///
    /// Immediate note-offs remove the entry at once; timed ones keep it until
    /// `prune` passes `host_time`, since a discontinuity before then could
    /// clear the pending note-off from the sink.
    pub fn note_off(&mut self, key: ActiveNoteKey, host_time: u64) {
        if host_time == IMMEDIATE {
            self.notes.remove(&key);
        } else if let Some(state) = self.notes.get_mut(&key) {
            *state = NoteState::Releasing { off_time: host_time };
        }
    }

    /// Drop entries whose note-off time is at or before `now_host`.
    pub fn prune(&mut self, now_host: u64) {
        while let Some(key) = self.first_expired(now_host) {
            self.notes.remove(&key);
        }
    }

    fn first_expired(&self, now_host: u64) -> Option<ActiveNoteKey> {
        self.notes.iter().find_map(|(key, state)| match state {
            NoteState::Releasing { off_time } if *off_time <= now_host => Some(*key),
            _ => None,
        })
    }

    /// Remove every entry for `track`, calling `f` with each removed key.
    pub fn drain_track(&mut self, track: TrackId, mut f: impl FnMut(ActiveNoteKey)) {
        while let Some(key) = self.first_of_track(track) {
            self.notes.remove(&key);
            f(key);
        }
    }

    fn first_of_track(&self, track: TrackId) -> Option<ActiveNoteKey> {
        self.notes.keys().find(|k| k.track == track).copied()
    }

    pub fn state(&self, key: &ActiveNoteKey) -> Option<NoteState> {
        self.notes.get(key).copied()
    }

    pub fn contains(&self, key: &ActiveNoteKey) -> bool {
        self.notes.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ActiveNoteKey> {
        self.notes.keys()
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.notes.len() == MAX_ACTIVE_NOTES
    }
}
