//! Beat-sorted event list with a playback cursor.

use bc_ir::ScheduledMidiEvent;

/// Events sorted by beat.
///
/// During playback, events are consumed via a cursor that advances forward
/// without removing elements, so the scan path never allocates. Seeking and
/// re-anchoring only move the cursor.
#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    events: Vec<ScheduledMidiEvent>,
    /// Next event index to emit.
    cursor: usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            cursor: 0,
        }
    }

    /// Replace the contents with `events`, stable-sorted by beat. Events with
    /// a non-finite beat are discarded. Setup phase only (allocates).
    pub fn load(&mut self, events: impl IntoIterator<Item = ScheduledMidiEvent>) {
        self.events.clear();
        self.events
            .extend(events.into_iter().filter(|e| e.beat.is_finite()));
        self.events.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        self.cursor = 0;
    }

    /// Move the cursor to the first event at or after `beat`.
    pub fn seek_to(&mut self, beat: f64) {
        self.cursor = self.events.partition_point(|e| e.beat < beat);
    }

    /// Return the next event with a beat strictly before `window_end` and
    /// advance past it.
    #[inline]
    pub fn next_before(&mut self, window_end: f64) -> Option<ScheduledMidiEvent> {
        let event = *self.events.get(self.cursor)?;
        if event.beat < window_end {
            self.cursor += 1;
            Some(event)
        } else {
            None
        }
    }

    /// Step the cursor back over already-emitted events while `pred` holds
    /// for the event just before it. Returns how many were un-emitted.
    pub fn rewind_while(&mut self, mut pred: impl FnMut(&ScheduledMidiEvent) -> bool) -> usize {
        let start = self.cursor;
        while self.cursor > 0 && pred(&self.events[self.cursor - 1]) {
            self.cursor -= 1;
        }
        start - self.cursor
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn events(&self) -> &[ScheduledMidiEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bc_ir::TrackId;

    fn note(beat: f64, pitch: u8) -> ScheduledMidiEvent {
        ScheduledMidiEvent::note_on(beat, TrackId(0), 0, pitch, 100)
    }

    #[test]
    fn load_sorts_by_beat() {
        let mut queue = EventQueue::new();
        queue.load([note(10.0, 1), note(5.0, 2), note(15.0, 3)]);
        let beats: Vec<f64> = queue.events().iter().map(|e| e.beat).collect();
        assert_eq!(beats, vec![5.0, 10.0, 15.0]);
    }

    #[test]
    fn load_drops_non_finite_beats() {
        let mut queue = EventQueue::new();
        queue.load([note(f64::NAN, 1), note(1.0, 2), note(f64::INFINITY, 3)]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn next_before_is_exclusive_and_advances() {
        let mut queue = EventQueue::new();
        queue.load([note(0.0, 1), note(1.0, 2), note(2.0, 3)]);

        assert_eq!(queue.next_before(1.0).map(|e| e.data1), Some(1));
        assert_eq!(queue.next_before(1.0), None);
        assert_eq!(queue.next_before(2.5).map(|e| e.data1), Some(2));
        assert_eq!(queue.next_before(2.5).map(|e| e.data1), Some(3));
        assert_eq!(queue.next_before(100.0), None);
    }

    #[test]
    fn seek_lands_on_first_event_at_beat() {
        let mut queue = EventQueue::new();
        queue.load([note(0.0, 1), note(4.0, 2), note(4.0, 3), note(8.0, 4)]);
        queue.seek_to(4.0);
        assert_eq!(queue.cursor(), 1);
        queue.seek_to(4.5);
        assert_eq!(queue.cursor(), 3);
        queue.seek_to(-1.0);
        assert_eq!(queue.cursor(), 0);
        queue.seek_to(99.0);
        assert_eq!(queue.cursor(), queue.len());
    }

    #[test]
    fn rewind_while_stops_at_predicate() {
        let mut queue = EventQueue::new();
        queue.load([note(0.0, 1), note(1.0, 2), note(2.0, 3)]);
        while queue.next_before(10.0).is_some() {}
        let rewound = queue.rewind_while(|e| e.beat > 0.5);
        assert_eq!(rewound, 2);
        assert_eq!(queue.cursor(), 1);
    }
}
