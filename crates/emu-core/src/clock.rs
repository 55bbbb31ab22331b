use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Master-clock resolution time unit. Negative values only ever appear
/// transiently while `advance` rebases listener state.
pub type Tick = i32;

/// Tick protocol implemented by every component that carries tick-valued
/// state (CPUs, video, audio, timers, mappers with counters).
///
/// The execute half of the contract is driven by the owning context: it
/// calls `set_desired_ticks` then the component's own `execute` entry in
/// registration order for every step of the dispatch loop.
pub trait ClockListener {
    /// Update the horizon this listener may advance to. The listener must
    /// not simulate past this tick during its next execute.
    fn set_desired_ticks(&mut self, ticks: Tick);

    /// The global clock was rebased; subtract `ticks` from every stored
    /// tick-valued field.
    fn advance_clock(&mut self, ticks: Tick);

    /// Clear all tick-valued fields to zero.
    fn reset_clock(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockState {
    pub version: u32,
    pub target_ticks: Tick,
    pub desired_ticks: Tick,
}

pub const CLOCK_STATE_VERSION: u32 = 1;

/// Global tick counter with a queue of scheduled events.
///
/// Events carry a caller-defined payload instead of a callback; the owning
/// context pops due events from its dispatch loop and routes them to the
/// right component. Events scheduled at the same tick fire in insertion
/// order.
pub struct Clock<E> {
    events: BTreeMap<(Tick, u64), E>,
    next_seq: u64,
    target_ticks: Tick,
    desired_ticks: Tick,
}

impl<E: Copy> Clock<E> {
    pub fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            next_seq: 0,
            target_ticks: 0,
            desired_ticks: 0,
        }
    }

    pub fn reset(&mut self) {
        self.events.clear();
        self.next_seq = 0;
        self.target_ticks = 0;
        self.desired_ticks = 0;
    }

    #[inline]
    pub fn desired_ticks(&self) -> Tick {
        self.desired_ticks
    }

    #[inline]
    pub fn target_ticks(&self) -> Tick {
        self.target_ticks
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Schedule `payload` to fire at `tick`. Scheduling below the current
    /// desired tick pulls the horizon back so listeners re-converge before
    /// the event is delivered.
    pub fn add_event(&mut self, payload: E, tick: Tick) {
        self.events.insert((tick, self.next_seq), payload);
        self.next_seq += 1;
        if tick < self.desired_ticks {
            self.desired_ticks = tick;
        }
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Start a run toward `target`. The caller then loops on `next_step`,
    /// executing every listener up to each returned horizon and draining
    /// `pop_due_event` after each step.
    pub fn begin_execute(&mut self, target: Tick) {
        self.target_ticks = target;
    }

    /// Advance the horizon to the next event (bounded by the target).
    /// Returns `None` once the target has been reached.
    pub fn next_step(&mut self) -> Option<Tick> {
        if self.desired_ticks >= self.target_ticks {
            return None;
        }
        let first_event = self.events.keys().next().map(|&(tick, _)| tick);
        let horizon = match first_event {
            Some(tick) => tick.min(self.target_ticks),
            None => self.target_ticks,
        };
        // A clamped insert may have pulled desired below an already-reached
        // horizon; never move backwards from here.
        self.desired_ticks = horizon.max(self.desired_ticks);
        Some(self.desired_ticks)
    }

    /// Pop the next event due at or before the current horizon, oldest
    /// insertion first for ties. Events the handler re-inserts at or below
    /// the horizon are picked up by the same drain loop.
    pub fn pop_due_event(&mut self) -> Option<(Tick, E)> {
        let (&(tick, seq), _) = self.events.iter().next()?;
        if tick > self.desired_ticks {
            return None;
        }
        let payload = self.events.remove(&(tick, seq))?;
        Some((tick, payload))
    }

    /// Rebase time to zero: subtract the completed target from every
    /// pending event. Callers must also invoke `advance_clock(target)` on
    /// every listener.
    pub fn advance(&mut self) -> Tick {
        let target = self.target_ticks;
        if target != 0 {
            let old = std::mem::take(&mut self.events);
            for ((tick, seq), payload) in old {
                self.events.insert((tick - target, seq), payload);
            }
        }
        self.desired_ticks -= target;
        self.target_ticks = 0;
        target
    }

    pub fn save_state(&self) -> ClockState {
        ClockState {
            version: CLOCK_STATE_VERSION,
            target_ticks: self.target_ticks,
            desired_ticks: self.desired_ticks,
        }
    }

    /// Restore between-frames counter state. The event queue is rebuilt by
    /// the context when it schedules the next frame, so a state claiming
    /// in-flight work is rejected.
    pub fn restore_state(&mut self, state: &ClockState) -> bool {
        if state.version != CLOCK_STATE_VERSION || state.target_ticks != 0 {
            return false;
        }
        self.events.clear();
        self.target_ticks = state.target_ticks;
        self.desired_ticks = state.desired_ticks;
        true
    }
}

impl<E: Copy> Default for Clock<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Ev {
        A,
        B,
        C,
    }

    fn drain(clock: &mut Clock<Ev>) -> Vec<(Tick, Ev)> {
        let mut fired = Vec::new();
        while let Some(ev) = clock.pop_due_event() {
            fired.push(ev);
        }
        fired
    }

    #[test]
    fn runs_to_target_without_events() {
        let mut clock: Clock<Ev> = Clock::new();
        clock.begin_execute(100);
        assert_eq!(clock.next_step(), Some(100));
        assert!(drain(&mut clock).is_empty());
        assert_eq!(clock.next_step(), None);
    }

    #[test]
    fn stops_at_each_event_tick() {
        let mut clock = Clock::new();
        clock.add_event(Ev::A, 30);
        clock.add_event(Ev::B, 70);
        clock.begin_execute(100);

        assert_eq!(clock.next_step(), Some(30));
        assert_eq!(drain(&mut clock), vec![(30, Ev::A)]);
        assert_eq!(clock.next_step(), Some(70));
        assert_eq!(drain(&mut clock), vec![(70, Ev::B)]);
        assert_eq!(clock.next_step(), Some(100));
        assert_eq!(clock.next_step(), None);
    }

    #[test]
    fn same_tick_events_fire_in_insertion_order() {
        let mut clock = Clock::new();
        clock.add_event(Ev::B, 50);
        clock.add_event(Ev::A, 50);
        clock.add_event(Ev::C, 50);
        clock.begin_execute(60);
        assert_eq!(clock.next_step(), Some(50));
        assert_eq!(drain(&mut clock), vec![(50, Ev::B), (50, Ev::A), (50, Ev::C)]);
    }

    #[test]
    fn event_inserted_during_drain_fires_in_same_pass() {
        let mut clock = Clock::new();
        clock.add_event(Ev::A, 40);
        clock.begin_execute(100);
        assert_eq!(clock.next_step(), Some(40));

        let (tick, ev) = clock.pop_due_event().unwrap();
        assert_eq!((tick, ev), (40, Ev::A));
        // Handler schedules a follow-up at the same horizon.
        clock.add_event(Ev::B, 40);
        assert_eq!(clock.pop_due_event(), Some((40, Ev::B)));
        assert_eq!(clock.pop_due_event(), None);
    }

    #[test]
    fn insert_below_desired_clamps_horizon() {
        let mut clock = Clock::new();
        clock.begin_execute(100);
        assert_eq!(clock.next_step(), Some(100));
        clock.add_event(Ev::A, 25);
        assert_eq!(clock.desired_ticks(), 25);
        assert_eq!(drain(&mut clock), vec![(25, Ev::A)]);
        // Horizon never moves backwards once the insert has been drained.
        assert_eq!(clock.next_step(), Some(100));
        assert_eq!(clock.next_step(), None);
    }

    #[test]
    fn events_past_target_stay_queued() {
        let mut clock = Clock::new();
        clock.add_event(Ev::A, 150);
        clock.begin_execute(100);
        assert_eq!(clock.next_step(), Some(100));
        assert!(drain(&mut clock).is_empty());
        assert_eq!(clock.next_step(), None);
        assert_eq!(clock.pending_events(), 1);
    }

    #[test]
    fn advance_rebases_pending_events_and_counters() {
        let mut clock = Clock::new();
        clock.add_event(Ev::A, 150);
        clock.begin_execute(100);
        while clock.next_step().is_some() {
            drain(&mut clock);
        }
        assert_eq!(clock.advance(), 100);
        assert_eq!(clock.target_ticks(), 0);
        assert_eq!(clock.desired_ticks(), 0);

        // The leftover event now sits 50 ticks into the next frame.
        clock.begin_execute(100);
        assert_eq!(clock.next_step(), Some(50));
        assert_eq!(drain(&mut clock), vec![(50, Ev::A)]);
    }

    #[test]
    fn counters_are_zero_between_frames() {
        let mut clock: Clock<Ev> = Clock::new();
        for _ in 0..3 {
            clock.begin_execute(1000);
            while clock.next_step().is_some() {
                drain(&mut clock);
            }
            clock.advance();
            assert_eq!(clock.target_ticks(), 0);
            assert_eq!(clock.desired_ticks(), 0);
        }
    }

    #[test]
    fn restore_rejects_mid_frame_state() {
        let mut clock: Clock<Ev> = Clock::new();
        let mut state = clock.save_state();
        state.target_ticks = 500;
        assert!(!clock.restore_state(&state));
        state.target_ticks = 0;
        assert!(clock.restore_state(&state));
    }
}
