//! Typed publish/subscribe hub for process lifecycle events.
//!
//! Each [`crate::process::ProcessController`] owns exactly one hub and
//! publishes its child's lifecycle and stream output through it. Callers
//! subscribe per event kind or with a wildcard subscriber that sees every
//! event. Dispatch is synchronous and ordered: kind-specific subscribers
//! fire in registration order, then wildcard subscribers in registration
//! order.

use std::collections::HashMap;

/// An event published by a process controller.
///
/// One variant per lifecycle signal, so a `match` over observed events is
/// checked for exhaustiveness at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// The child process spawned and reported a pid. Fired once, before any
    /// other event from the same controller.
    Start,
    /// A chunk of stdout, exactly as read (no line framing).
    Data(String),
    /// A chunk of stderr, or the message of a stream-level I/O error.
    Error(String),
    /// The child exited. `None` means it was killed or otherwise terminated
    /// without a numeric exit code.
    Exit(Option<i32>),
}

impl ProcessEvent {
    /// The kind discriminant for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            ProcessEvent::Start => EventKind::Start,
            ProcessEvent::Data(_) => EventKind::Data,
            ProcessEvent::Error(_) => EventKind::Error,
            ProcessEvent::Exit(_) => EventKind::Exit,
        }
    }
}

/// Fieldless discriminant of [`ProcessEvent`], used to key subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Data,
    Error,
    Exit,
}

impl EventKind {
    /// Stable lowercase name, used in log records and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Data => "data",
            EventKind::Error => "error",
            EventKind::Exit => "exit",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle identifying one subscription, returned by [`EventHub::on`]
/// and [`EventHub::on_any`] and accepted by the matching `off` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&ProcessEvent) + Send>;

/// Ordered publish/subscribe hub over [`ProcessEvent`].
///
/// The hub never catches subscriber panics: a panicking subscriber
/// propagates to the caller of [`EventHub::emit`]. The controller's pump
/// task guards its own dispatch so stream handling survives; external
/// callers of `emit` (tests, mostly) get the panic.
#[derive(Default)]
pub struct EventHub {
    /// Kind-specific subscribers, each list in registration order.
    by_kind: HashMap<EventKind, Vec<(SubscriptionId, Subscriber)>>,
    /// Wildcard subscribers, invoked after kind-specific ones.
    wildcard: Vec<(SubscriptionId, Subscriber)>,
    /// Source of unique subscription ids.
    next_id: u64,
}

impl EventHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Register `callback` for events of `kind`.
    ///
    /// Registering the same closure twice produces two invocations per
    /// emission; each registration has its own id.
    pub fn on(
        &mut self,
        kind: EventKind,
        callback: impl FnMut(&ProcessEvent) + Send + 'static,
    ) -> SubscriptionId {
        let id = self.fresh_id();
        self.by_kind
            .entry(kind)
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    /// Remove the subscription `id` from `kind`, if present.
    ///
    /// Removing an id that is not registered under `kind` is a no-op.
    pub fn off(&mut self, kind: EventKind, id: SubscriptionId) {
        if let Some(list) = self.by_kind.get_mut(&kind) {
            if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                let _ = list.remove(pos);
            }
        }
    }

    /// Register a wildcard `callback` invoked for every event. The event's
    /// kind is recoverable via [`ProcessEvent::kind`].
    pub fn on_any(
        &mut self,
        callback: impl FnMut(&ProcessEvent) + Send + 'static,
    ) -> SubscriptionId {
        let id = self.fresh_id();
        self.wildcard.push((id, Box::new(callback)));
        id
    }

    /// Remove the wildcard subscription `id`, if present. No-op otherwise.
    pub fn off_any(&mut self, id: SubscriptionId) {
        if let Some(pos) = self.wildcard.iter().position(|(sid, _)| *sid == id) {
            let _ = self.wildcard.remove(pos);
        }
    }

    /// Clear subscribers.
    ///
    /// With `Some(kind)`, clears only that kind's list. With `None`, clears
    /// every kind-specific list and the wildcard list.
    pub fn reset(&mut self, kind: Option<EventKind>) {
        match kind {
            Some(kind) => {
                self.by_kind.remove(&kind);
            }
            None => {
                self.by_kind.clear();
                self.wildcard.clear();
            }
        }
    }

    /// Publish `event`: kind-specific subscribers first, then wildcard
    /// subscribers, each list in registration order.
    pub fn emit(&mut self, event: &ProcessEvent) {
        if let Some(list) = self.by_kind.get_mut(&event.kind()) {
            for (_, callback) in list.iter_mut() {
                callback(event);
            }
        }
        for (_, callback) in self.wildcard.iter_mut() {
            callback(event);
        }
    }

    /// Total number of live subscriptions (kind-specific plus wildcard).
    pub fn subscriber_count(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum::<usize>() + self.wildcard.len()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind_count: usize = self.by_kind.values().map(Vec::len).sum();
        f.debug_struct("EventHub")
            .field("kind_subscribers", &kind_count)
            .field("wildcard_subscribers", &self.wildcard.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Helper: a subscriber that appends a label to a shared log.
    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        label: &str,
    ) -> impl FnMut(&ProcessEvent) + Send + use<> {
        let log = Arc::clone(log);
        let label = label.to_string();
        move |event| {
            log.lock()
                .unwrap()
                .push(format!("{label}:{}", event.kind()));
        }
    }

    #[test]
    fn emit_invokes_kind_subscribers_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = EventHub::new();
        hub.on(EventKind::Data, recorder(&log, "first"));
        hub.on(EventKind::Data, recorder(&log, "second"));

        hub.emit(&ProcessEvent::Data("x".into()));

        assert_eq!(*log.lock().unwrap(), vec!["first:data", "second:data"]);
    }

    #[test]
    fn kind_subscribers_fire_before_wildcard() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = EventHub::new();
        hub.on_any(recorder(&log, "any"));
        hub.on(EventKind::Start, recorder(&log, "kind"));

        hub.emit(&ProcessEvent::Start);

        // Wildcard registered first, but kind-specific still fires first.
        assert_eq!(*log.lock().unwrap(), vec!["kind:start", "any:start"]);
    }

    #[test]
    fn wildcard_sees_every_kind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = EventHub::new();
        hub.on_any(recorder(&log, "any"));

        hub.emit(&ProcessEvent::Start);
        hub.emit(&ProcessEvent::Data("d".into()));
        hub.emit(&ProcessEvent::Error("e".into()));
        hub.emit(&ProcessEvent::Exit(Some(0)));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["any:start", "any:data", "any:error", "any:exit"]
        );
    }

    #[test]
    fn subscribers_of_other_kinds_do_not_fire() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = EventHub::new();
        hub.on(EventKind::Error, recorder(&log, "err"));

        hub.emit(&ProcessEvent::Data("x".into()));

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn same_callback_registered_twice_fires_twice() {
        let count = Arc::new(Mutex::new(0));
        let mut hub = EventHub::new();
        for _ in 0..2 {
            let count = Arc::clone(&count);
            hub.on(EventKind::Data, move |_| *count.lock().unwrap() += 1);
        }

        hub.emit(&ProcessEvent::Data("x".into()));

        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn off_removes_only_the_given_subscription() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = EventHub::new();
        let first = hub.on(EventKind::Data, recorder(&log, "first"));
        hub.on(EventKind::Data, recorder(&log, "second"));

        hub.off(EventKind::Data, first);
        hub.emit(&ProcessEvent::Data("x".into()));

        assert_eq!(*log.lock().unwrap(), vec!["second:data"]);
    }

    #[test]
    fn off_unknown_id_is_a_noop() {
        let mut hub = EventHub::new();
        let id = hub.on(EventKind::Data, |_| {});
        hub.off(EventKind::Data, id);

        // Second removal of the same id, and removal under a kind it was
        // never registered for, must both be silent no-ops.
        hub.off(EventKind::Data, id);
        hub.off(EventKind::Exit, id);
    }

    #[test]
    fn off_any_unknown_id_is_a_noop() {
        let mut hub = EventHub::new();
        let id = hub.on_any(|_| {});
        hub.off_any(id);
        hub.off_any(id);
    }

    #[test]
    fn off_with_wrong_kind_leaves_subscription_alive() {
        let count = Arc::new(Mutex::new(0));
        let mut hub = EventHub::new();
        let id = {
            let count = Arc::clone(&count);
            hub.on(EventKind::Data, move |_| *count.lock().unwrap() += 1)
        };

        hub.off(EventKind::Error, id);
        hub.emit(&ProcessEvent::Data("x".into()));

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn reset_kind_clears_only_that_kind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = EventHub::new();
        hub.on(EventKind::Data, recorder(&log, "data"));
        hub.on(EventKind::Error, recorder(&log, "err"));
        hub.on_any(recorder(&log, "any"));

        hub.reset(Some(EventKind::Data));
        hub.emit(&ProcessEvent::Data("x".into()));
        hub.emit(&ProcessEvent::Error("y".into()));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["any:data", "err:error", "any:error"]
        );
    }

    #[test]
    fn reset_all_leaves_nothing_to_invoke() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = EventHub::new();
        hub.on(EventKind::Data, recorder(&log, "data"));
        hub.on_any(recorder(&log, "any"));

        hub.reset(None);
        hub.emit(&ProcessEvent::Data("x".into()));
        hub.emit(&ProcessEvent::Exit(Some(0)));

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn event_kind_round_trip() {
        assert_eq!(ProcessEvent::Start.kind(), EventKind::Start);
        assert_eq!(ProcessEvent::Data(String::new()).kind(), EventKind::Data);
        assert_eq!(ProcessEvent::Error(String::new()).kind(), EventKind::Error);
        assert_eq!(ProcessEvent::Exit(None).kind(), EventKind::Exit);
        assert_eq!(EventKind::Exit.as_str(), "exit");
    }

    #[test]
    fn hub_debug_shows_counts() {
        let mut hub = EventHub::new();
        hub.on(EventKind::Data, |_| {});
        hub.on_any(|_| {});
        let debug = format!("{hub:?}");
        assert!(debug.contains("EventHub"));
        assert!(debug.contains("wildcard_subscribers"));
    }
}
