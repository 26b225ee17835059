use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{instrument, trace, warn};

use crate::protocol::ServiceEndpoint;

type ListenerFn = dyn Fn(&[u8]) -> anyhow::Result<()> + Send + Sync;

/// Callback receiving raw notification payloads.
///
/// Listener identity is the identity of the wrapped callback: clones of one
/// `Listener` are the same listener, two `Listener::new` calls are not.
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    /// Wraps a callback.
    ///
    /// ```
    /// use shining_glasses::Listener;
    ///
    /// let listener = Listener::new(|payload| {
    ///     println!("{} bytes", payload.len());
    ///     Ok(())
    /// });
    /// assert_eq!(listener, listener.clone());
    /// ```
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&[u8]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    fn id(&self) -> *const () {
        Arc::as_ptr(&self.0).cast::<()>()
    }

    fn invoke(&self, payload: &[u8]) -> anyhow::Result<()> {
        (self.0)(payload)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener").field(&self.id()).finish()
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct DispatchReport {
    delivered: usize,
    failed: usize,
}

impl DispatchReport {
    /// Listeners that returned `Ok`.
    #[must_use]
    pub fn delivered(self) -> usize {
        self.delivered
    }

    /// Listeners that returned an error or panicked.
    #[must_use]
    pub fn failed(self) -> usize {
        self.failed
    }
}

/// Listener registry keyed by service endpoint.
#[derive(Debug, Default)]
pub struct NotificationRouter {
    listeners: RwLock<HashMap<ServiceEndpoint, Vec<Listener>>>,
}

impl NotificationRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `endpoint`. Registering it twice is a no-op.
    ///
    /// Returns `true` when the listener was newly added.
    #[instrument(skip(self, listener), level = "debug", fields(%endpoint))]
    pub fn subscribe(&self, endpoint: ServiceEndpoint, listener: Listener) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let registered = listeners.entry(endpoint).or_default();
        if registered.contains(&listener) {
            return false;
        }
        registered.push(listener);
        true
    }

    /// Removes `listener` from `endpoint`, if registered.
    ///
    /// Returns `true` when a listener was removed.
    #[instrument(skip(self, listener), level = "debug", fields(%endpoint))]
    pub fn unsubscribe(&self, endpoint: ServiceEndpoint, listener: &Listener) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(registered) = listeners.get_mut(&endpoint) else {
            return false;
        };

        let before = registered.len();
        registered.retain(|candidate| candidate != listener);
        let removed = registered.len() != before;
        if registered.is_empty() {
            listeners.remove(&endpoint);
        }
        removed
    }

    /// Number of listeners registered for `endpoint`.
    #[must_use]
    pub fn listener_count(&self, endpoint: ServiceEndpoint) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&endpoint)
            .map_or(0, Vec::len)
    }

    /// Delivers `payload` to every listener registered for `endpoint`.
    ///
    /// The listener set is snapshotted first, so registrations changed by a
    /// listener take effect from the next dispatch. Listener errors and
    /// panics are logged and counted, never propagated.
    #[instrument(
        skip(self, payload),
        level = "trace",
        fields(%endpoint, payload_len = payload.len())
    )]
    pub fn dispatch(&self, endpoint: ServiceEndpoint, payload: &[u8]) -> DispatchReport {
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&endpoint)
            .cloned()
            .unwrap_or_default();

        let mut report = DispatchReport::default();
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener.invoke(payload))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(error)) => {
                    report.failed += 1;
                    warn!(%endpoint, error = %format!("{error:#}"), "notification listener failed");
                }
                Err(_panic) => {
                    report.failed += 1;
                    warn!(%endpoint, "notification listener panicked");
                }
            }
        }

        trace!(
            delivered = report.delivered,
            failed = report.failed,
            "dispatched notification"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::protocol::EndpointId;

    fn counting_listener(counter: &Arc<AtomicUsize>) -> Listener {
        let counter = Arc::clone(counter);
        Listener::new(move |_payload| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn status() -> ServiceEndpoint {
        EndpointId::StatusCharacteristic.endpoint()
    }

    #[test]
    fn dispatch_invokes_listener_once_per_call() {
        let router = NotificationRouter::new();
        let counter = Arc::new(AtomicUsize::new(0));
        router.subscribe(status(), counting_listener(&counter));

        router.dispatch(status(), &[0x01]);
        router.dispatch(status(), &[0x02]);

        assert_eq!(2, counter.load(Ordering::SeqCst));
    }

    #[test]
    fn subscribe_is_idempotent() {
        let router = NotificationRouter::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let listener = counting_listener(&counter);

        assert!(router.subscribe(status(), listener.clone()));
        assert!(!router.subscribe(status(), listener));
        let report = router.dispatch(status(), &[0x01]);

        assert_eq!(1, report.delivered());
        assert_eq!(1, counter.load(Ordering::SeqCst));
    }

    #[test]
    fn unsubscribed_listener_is_not_invoked() {
        let router = NotificationRouter::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let listener = counting_listener(&counter);
        router.subscribe(status(), listener.clone());

        assert!(router.unsubscribe(status(), &listener));
        router.dispatch(status(), &[0x01]);

        assert_eq!(0, counter.load(Ordering::SeqCst));
        assert_eq!(0, router.listener_count(status()));
    }

    #[test]
    fn unsubscribe_unknown_listener_is_silent() {
        let router = NotificationRouter::new();
        let listener = Listener::new(|_payload| Ok(()));
        assert!(!router.unsubscribe(status(), &listener));
    }

    #[test]
    fn dispatch_without_listeners_is_a_no_op() {
        let router = NotificationRouter::new();
        assert_eq!(DispatchReport::default(), router.dispatch(status(), &[0xFF]));
    }

    #[test]
    fn listeners_are_keyed_by_endpoint() {
        let router = NotificationRouter::new();
        let counter = Arc::new(AtomicUsize::new(0));
        router.subscribe(status(), counting_listener(&counter));

        router.dispatch(EndpointId::CommandCharacteristic.endpoint(), &[0x01]);

        assert_eq!(0, counter.load(Ordering::SeqCst));
    }

    #[test]
    fn failing_listeners_do_not_stop_dispatch() {
        let router = NotificationRouter::new();
        let counter = Arc::new(AtomicUsize::new(0));
        router.subscribe(
            status(),
            Listener::new(|_payload| Err(anyhow::anyhow!("listener broke"))),
        );
        router.subscribe(
            status(),
            Listener::new(|_payload| panic!("listener panicked")),
        );
        router.subscribe(status(), counting_listener(&counter));

        let report = router.dispatch(status(), &[0x01]);

        assert_eq!(1, report.delivered());
        assert_eq!(2, report.failed());
        assert_eq!(1, counter.load(Ordering::SeqCst));
    }

    #[test]
    fn dispatch_uses_snapshot_of_listeners() {
        let router = Arc::new(NotificationRouter::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let late = counting_listener(&counter);
        let added = Arc::new(Mutex::new(false));

        let registering = {
            let router = Arc::clone(&router);
            let added = Arc::clone(&added);
            Listener::new(move |_payload| {
                router.subscribe(status(), late.clone());
                *added.lock().unwrap() = true;
                Ok(())
            })
        };
        router.subscribe(status(), registering);

        let first = router.dispatch(status(), &[0x01]);
        assert_eq!(1, first.delivered());
        assert_eq!(0, counter.load(Ordering::SeqCst));
        assert!(*added.lock().unwrap());

        router.dispatch(status(), &[0x02]);
        assert_eq!(1, counter.load(Ordering::SeqCst));
    }
}
