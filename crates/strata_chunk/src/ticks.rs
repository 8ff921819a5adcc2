//! Delayed block and fluid ticks scheduled inside a chunk.

use std::hash::Hash;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use strata_protocol::BlockPos;

#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug, Serialize, Deserialize,
)]
pub enum TickPriority {
    ExtremelyHigh,
    VeryHigh,
    High,
    #[default]
    Normal,
    Low,
    VeryLow,
    ExtremelyLow,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ScheduledTick<T> {
    pub kind: T,
    pub pos: BlockPos,
    /// Game time at which the tick fires.
    pub trigger_tick: i64,
    pub priority: TickPriority,
    /// Tie breaker preserving scheduling order.
    pub sub_tick: u64,
}

/// A tick in storage form, with a delay relative to the time it was saved.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SavedTick<T> {
    pub kind: T,
    pub pos: BlockPos,
    pub delay: i32,
    pub priority: TickPriority,
}

impl<T> SavedTick<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SavedTick<U> {
        SavedTick {
            kind: f(self.kind),
            pos: self.pos,
            delay: self.delay,
            priority: self.priority,
        }
    }
}

/// At most one tick per (position, kind).
#[derive(Clone, Debug)]
pub struct TickSchedule<T> {
    ticks: Vec<ScheduledTick<T>>,
    keys: FxHashSet<(BlockPos, T)>,
    next_sub_tick: u64,
}

impl<T: Copy + Eq + Hash> TickSchedule<T> {
    pub fn new() -> Self {
        Self {
            ticks: vec![],
            keys: FxHashSet::default(),
            next_sub_tick: 0,
        }
    }

    /// Schedules a tick. Returns `false` if one is already pending for the
    /// same position and kind.
    pub fn schedule(
        &mut self,
        kind: T,
        pos: BlockPos,
        trigger_tick: i64,
        priority: TickPriority,
    ) -> bool {
        if !self.keys.insert((pos, kind)) {
            return false;
        }

        self.ticks.push(ScheduledTick {
            kind,
            pos,
            trigger_tick,
            priority,
            sub_tick: self.next_sub_tick,
        });
        self.next_sub_tick += 1;
        true
    }

    pub fn has_scheduled(&self, pos: BlockPos, kind: T) -> bool {
        self.keys.contains(&(pos, kind))
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Removes and returns every tick due at `now`, ordered by trigger time,
    /// then priority, then scheduling order.
    pub fn drain_due(&mut self, now: i64) -> Vec<ScheduledTick<T>> {
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.ticks.drain(..).partition(|t| t.trigger_tick <= now);
        self.ticks = rest;

        for t in &due {
            self.keys.remove(&(t.pos, t.kind));
        }

        due.sort_by_key(|t| (t.trigger_tick, t.priority, t.sub_tick));
        due
    }

    /// Storage form relative to `now`.
    pub fn save(&self, now: i64) -> Vec<SavedTick<T>> {
        let mut ticks = self.ticks.clone();
        ticks.sort_by_key(|t| (t.trigger_tick, t.priority, t.sub_tick));

        ticks
            .into_iter()
            .map(|t| SavedTick {
                kind: t.kind,
                pos: t.pos,
                delay: (t.trigger_tick - now).clamp(i32::MIN.into(), i32::MAX.into()) as i32,
                priority: t.priority,
            })
            .collect()
    }

    pub fn load(saved: impl IntoIterator<Item = SavedTick<T>>, now: i64) -> Self {
        let mut schedule = Self::new();
        for t in saved {
            schedule.schedule(t.kind, t.pos, now + i64::from(t.delay), t.priority);
        }
        schedule
    }
}

impl<T: Copy + Eq + Hash> Default for TickSchedule<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_ticks_are_ordered() {
        let mut ticks = TickSchedule::new();
        let p = |x| BlockPos::new(x, 0, 0);

        assert!(ticks.schedule(1_u8, p(0), 20, TickPriority::Normal));
        assert!(ticks.schedule(1, p(1), 10, TickPriority::Low));
        assert!(ticks.schedule(1, p(2), 10, TickPriority::High));
        assert!(ticks.schedule(2, p(3), 30, TickPriority::Normal));
        assert!(!ticks.schedule(1, p(0), 5, TickPriority::Normal));

        let due: Vec<_> = ticks.drain_due(20).into_iter().map(|t| t.pos.x).collect();
        assert_eq!(due, [2, 1, 0]);
        assert_eq!(ticks.len(), 1);
        assert!(!ticks.has_scheduled(p(0), 1));
        assert!(ticks.schedule(1, p(0), 50, TickPriority::Normal));
    }

    #[test]
    fn save_is_relative() {
        let mut ticks = TickSchedule::new();
        ticks.schedule(7_u8, BlockPos::new(1, 2, 3), 105, TickPriority::VeryHigh);

        let saved = ticks.save(100);
        assert_eq!(saved, [SavedTick {
            kind: 7,
            pos: BlockPos::new(1, 2, 3),
            delay: 5,
            priority: TickPriority::VeryHigh,
        }]);

        let mut loaded = TickSchedule::load(saved, 1000);
        assert!(loaded.drain_due(1004).is_empty());
        assert_eq!(loaded.drain_due(1005).len(), 1);
    }
}
