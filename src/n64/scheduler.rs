use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum EventType {
    ViLine,
    AiSample,
    AudioFrame,
}

#[derive(Deserialize, Eq, PartialEq, Serialize)]
struct Event {
    event_type: EventType,
    param: i32,

    timestamp: i64,
    sequence: u64,
}

impl Ord for Event {
    fn cmp(&self, other: &Event) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest event surfaces.
        // The sequence number keeps equal timestamps in insertion order.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then(other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Event) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Deserialize, Serialize)]
pub struct Scheduler {
    events: BinaryHeap<Event>,
    timestamp: i64,
    sequence: u64,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler {
            events: BinaryHeap::new(),
            timestamp: 0,
            sequence: 0,
        }
    }

    pub fn reset(&mut self) {
        self.events.clear();
        self.timestamp = 0;
        self.sequence = 0;
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_run_cycles(&self) -> i64 {
        super::MAX_RUN_CYCLES
    }

    pub fn add_event(&mut self, event_type: EventType, param: i32, cycles_until_event: i64) {
        assert!(cycles_until_event > 0);

        self.events.push(Event {
            event_type,
            param,
            timestamp: self.timestamp + cycles_until_event,
            sequence: self.sequence,
        });

        self.sequence += 1;
    }

    /// Pops the next event due inside the current quantum. `finish_quantum`
    /// must be called once no more events are due so the cursor lands on
    /// exactly `timestamp + quantum`.
    pub fn next_event(&mut self, quantum: i64) -> Option<(EventType, i32)> {
        let deadline = self.timestamp + quantum;

        if let Some(event) = self.events.peek() {
            if event.timestamp <= deadline {
                let event = self.events.pop().unwrap();

                self.timestamp = event.timestamp;
                return Some((event.event_type, event.param));
            }
        }

        None
    }

    pub fn finish_quantum(&mut self, quantum: i64) {
        self.timestamp += quantum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_fire_in_timestamp_order() {
        let mut scheduler = Scheduler::new();

        scheduler.add_event(EventType::AiSample, 0, 300);
        scheduler.add_event(EventType::ViLine, 1, 100);
        scheduler.add_event(EventType::AudioFrame, 2, 200);

        assert_eq!(scheduler.next_event(4096), Some((EventType::ViLine, 1)));
        assert_eq!(scheduler.timestamp(), 100);
        assert_eq!(scheduler.next_event(3996), Some((EventType::AudioFrame, 2)));
        assert_eq!(scheduler.next_event(3896), Some((EventType::AiSample, 0)));
        assert_eq!(scheduler.next_event(3796), None);

        scheduler.finish_quantum(3796);
        assert_eq!(scheduler.timestamp(), 4096);
    }

    #[test]
    fn equal_timestamps_fire_in_insertion_order() {
        let mut scheduler = Scheduler::new();

        scheduler.add_event(EventType::AiSample, 0, 64);
        scheduler.add_event(EventType::ViLine, 1, 64);

        assert_eq!(scheduler.next_event(4096), Some((EventType::AiSample, 0)));
        assert_eq!(scheduler.next_event(4032), Some((EventType::ViLine, 1)));
    }

    #[test]
    fn events_beyond_the_quantum_wait() {
        let mut scheduler = Scheduler::new();

        scheduler.add_event(EventType::ViLine, 0, 5000);

        assert_eq!(scheduler.next_event(4096), None);
        scheduler.finish_quantum(4096);
        assert_eq!(scheduler.next_event(4096), Some((EventType::ViLine, 0)));
    }
}
