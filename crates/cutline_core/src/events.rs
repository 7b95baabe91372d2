use crate::producer::Producer;
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// What the properties panel should show after a selection change.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectedItem {
    Clip {
        track: usize,
        clip: usize,
        producer: Producer,
    },
    Track(usize),
    Multitrack,
}

/// Notifications published by the timeline to UI and playback observers.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    SelectionChanged,
    Selected(Option<SelectedItem>),
    PositionChanged(i32),
    ClipCopied,
    FilterAdded { track: usize, clip: usize },
    AttachedFilterChanged { track: usize, clip: usize },
    /// Flash the lock indicator on a track that refused an edit.
    TrackLockPulse(usize),
    StatusMessage(String),
    DropAccepted { track: usize, clip: usize },
    DropRejected { track: usize },
    FadeInChanged(i32),
    FadeOutChanged(i32),
    ClipContentChanged { track: usize, clip: usize },
    TracksChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&TimelineEvent)>;

#[derive(Default)]
struct Subscribers {
    active: RefCell<Vec<(SubscriptionId, Callback)>>,
    pending: RefCell<Vec<(SubscriptionId, Callback)>>,
    removed: RefCell<HashSet<SubscriptionId>>,
    queued: RefCell<VecDeque<TimelineEvent>>,
    next_id: RefCell<u64>,
}

/// Synchronous publish/subscribe channel shared by the model, the selection
/// state and the orchestrator. Cloning yields another handle to the same
/// subscriber list.
///
/// Subscribers run in registration order on the emitting thread. An event
/// emitted from inside a subscriber is queued and delivered once the current
/// event has reached everyone, before the outer `emit` returns.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<Subscribers>,
}

pub type EventLog = Rc<RefCell<Vec<TimelineEvent>>>;

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl FnMut(&TimelineEvent) + 'static) -> SubscriptionId {
        let id = {
            let mut next = self.inner.next_id.borrow_mut();
            *next += 1;
            SubscriptionId(*next)
        };
        self.inner
            .pending
            .borrow_mut()
            .push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.removed.borrow_mut().insert(id);
    }

    /// Subscribe a recorder that keeps every event in order.
    pub fn record(&self) -> EventLog {
        let log: EventLog = Rc::default();
        let sink = Rc::clone(&log);
        self.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        log
    }

    pub fn emit(&self, event: TimelineEvent) {
        self.inner.queued.borrow_mut().push_back(event);
        let Ok(mut active) = self.inner.active.try_borrow_mut() else {
            debug!("nested timeline event queued");
            return;
        };
        loop {
            let Some(event) = self.next_queued() else {
                break;
            };
            active.append(&mut self.inner.pending.borrow_mut());
            {
                let removed = self.inner.removed.borrow();
                if !removed.is_empty() {
                    active.retain(|(id, _)| !removed.contains(id));
                }
            }
            self.inner.removed.borrow_mut().clear();
            for (id, callback) in active.iter_mut() {
                if self.inner.removed.borrow().contains(id) {
                    continue;
                }
                callback(&event);
            }
        }
    }

    fn next_queued(&self) -> Option<TimelineEvent> {
        self.inner.queued.borrow_mut().pop_front()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.inner.active.try_borrow().map(|a| a.len()).ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_registration_order() {
        let bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let order = Rc::clone(&order);
            bus.subscribe(move |_| order.borrow_mut().push(n));
        }
        bus.emit(TimelineEvent::SelectionChanged);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn clones_share_subscribers() {
        let bus = EventBus::new();
        let log = bus.record();
        bus.clone().emit(TimelineEvent::PositionChanged(12));
        assert_eq!(*log.borrow(), vec![TimelineEvent::PositionChanged(12)]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let id = bus.subscribe(move |_| *c.borrow_mut() += 1);
        bus.emit(TimelineEvent::ClipCopied);
        bus.unsubscribe(id);
        bus.emit(TimelineEvent::ClipCopied);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn nested_emit_follows_the_outer_event() {
        let bus = EventBus::new();
        let log = bus.record();
        let inner = bus.clone();
        bus.subscribe(move |event| {
            if *event == TimelineEvent::SelectionChanged {
                inner.emit(TimelineEvent::TrackLockPulse(3));
            }
        });
        let late = bus.record();
        bus.emit(TimelineEvent::SelectionChanged);
        let expected = vec![TimelineEvent::SelectionChanged, TimelineEvent::TrackLockPulse(3)];
        assert_eq!(*log.borrow(), expected);
        assert_eq!(*late.borrow(), expected, "every subscriber sees the outer event first");
    }

    #[test]
    fn subscribe_during_emit_takes_effect_next_time() {
        let bus = EventBus::new();
        let late: Rc<RefCell<Option<EventLog>>> = Rc::default();
        let handle = bus.clone();
        let slot = Rc::clone(&late);
        bus.subscribe(move |_| {
            if slot.borrow().is_none() {
                *slot.borrow_mut() = Some(handle.record());
            }
        });
        bus.emit(TimelineEvent::TracksChanged);
        bus.emit(TimelineEvent::ClipCopied);
        let log = late.borrow().clone().unwrap();
        assert_eq!(*log.borrow(), vec![TimelineEvent::ClipCopied]);
    }
}
