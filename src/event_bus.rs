use super::*;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Receives render events from a [`RenderEventSource`].
///
/// `on_next` for a batch runs before the call that produced the batch
/// returns. A panicking observer does not prevent delivery to the others.
pub trait RenderEventObserver: Send + Sync {
    fn on_next(&self, event: &RenderEvent);

    /// Called at most once, after which no further `on_next` arrives.
    fn on_completed(&self) {}

    /// Entry point used by sources. Relaying observers return the failure
    /// messages of their own subscribers; the default just runs `on_next`.
    fn receive(&self, event: &RenderEvent) -> Vec<String> {
        self.on_next(event);
        Vec::new()
    }
}

struct FnObserver<F>(F);

impl<F> RenderEventObserver for FnObserver<F>
where
    F: Fn(&RenderEvent) + Send + Sync,
{
    fn on_next(&self, event: &RenderEvent) {
        (self.0)(event)
    }
}

pub trait RenderEventSource: Send + Sync {
    fn subscribe(&self, observer: Arc<dyn RenderEventObserver>) -> Subscription;

    fn subscribe_fn<F>(&self, on_next: F) -> Subscription
    where
        F: Fn(&RenderEvent) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe(Arc::new(FnObserver(on_next)))
    }
}

/// Keeps an observer attached; dropping it detaches the observer.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub(crate) fn inert() -> Self {
        Self { unsubscribe: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[derive(Default)]
struct ObserverList {
    observers: Vec<(u64, Arc<dyn RenderEventObserver>)>,
    next_id: u64,
    completed: bool,
}

impl ObserverList {
    fn add(&mut self, observer: Arc<dyn RenderEventObserver>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    fn remove(&mut self, id: u64) {
        self.observers.retain(|(existing, _)| *existing != id);
    }

    fn snapshot(&self) -> Vec<Arc<dyn RenderEventObserver>> {
        self.observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    fn complete(&mut self) -> Vec<Arc<dyn RenderEventObserver>> {
        self.completed = true;
        std::mem::take(&mut self.observers)
            .into_iter()
            .map(|(_, observer)| observer)
            .collect()
    }
}

fn deliver(observers: &[Arc<dyn RenderEventObserver>], event: &RenderEvent) -> Vec<String> {
    let mut failures = Vec::new();
    for observer in observers {
        match catch_unwind(AssertUnwindSafe(|| observer.receive(event))) {
            Ok(relayed) => failures.extend(relayed),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(
                    sequence = event.sequence(),
                    "render event subscriber panicked: {message}"
                );
                failures.push(message);
            }
        }
    }
    failures
}

fn notify_completed(observers: Vec<Arc<dyn RenderEventObserver>>) {
    for observer in observers {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer.on_completed())) {
            tracing::warn!(
                "render event subscriber panicked on completion: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

/// Multicasts every render batch of one renderer to its subscribers.
#[derive(Clone, Default)]
pub struct RenderEventBus {
    inner: Arc<Mutex<ObserverList>>,
}

impl RenderEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to every current subscriber before returning.
    pub fn publish(&self, event: &RenderEvent) -> Result<()> {
        let observers = {
            let list = lock(&self.inner);
            if list.completed {
                return Err(Error::PostCompletionUsage);
            }
            list.snapshot()
        };

        let failures = deliver(&observers, event);
        match failures.first() {
            None => Ok(()),
            Some(first) => Err(Error::SubscriberFailed {
                count: failures.len(),
                message: first.clone(),
            }),
        }
    }

    /// Signals completion once; later calls are no-ops.
    pub fn complete(&self) {
        let observers = {
            let mut list = lock(&self.inner);
            if list.completed {
                return;
            }
            list.complete()
        };
        notify_completed(observers);
    }

    pub fn is_completed(&self) -> bool {
        lock(&self.inner).completed
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).observers.len()
    }

    /// Derived stream that only forwards events matching `predicate`.
    pub fn filter<P>(&self, predicate: P) -> FilteredRenderEvents
    where
        P: Fn(&RenderEvent) -> bool + Send + Sync + 'static,
    {
        FilteredRenderEvents::new(Arc::new(self.clone()), Arc::new(predicate))
    }
}

impl RenderEventSource for RenderEventBus {
    fn subscribe(&self, observer: Arc<dyn RenderEventObserver>) -> Subscription {
        let id = {
            let mut list = lock(&self.inner);
            if list.completed {
                None
            } else {
                Some(list.add(Arc::clone(&observer)))
            }
        };
        let Some(id) = id else {
            notify_completed(vec![observer]);
            return Subscription::inert();
        };

        let list = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                lock(&list).remove(id);
            }
        })
    }
}

impl fmt::Debug for RenderEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = lock(&self.inner);
        f.debug_struct("RenderEventBus")
            .field("subscribers", &list.observers.len())
            .field("completed", &list.completed)
            .finish()
    }
}

type EventPredicate = Arc<dyn Fn(&RenderEvent) -> bool + Send + Sync>;

struct FilterInner {
    upstream: Arc<dyn RenderEventSource>,
    predicate: EventPredicate,
    state: Mutex<FilterState>,
}

#[derive(Default)]
struct FilterState {
    listeners: ObserverList,
    upstream: Option<Subscription>,
}

struct FilterForwarder {
    filter: Weak<FilterInner>,
}

impl RenderEventObserver for FilterForwarder {
    fn on_next(&self, event: &RenderEvent) {
        // Failures were already logged by `deliver`.
        let _ = self.receive(event);
    }

    fn receive(&self, event: &RenderEvent) -> Vec<String> {
        let Some(filter) = self.filter.upgrade() else {
            return Vec::new();
        };
        if !(filter.predicate)(event) {
            return Vec::new();
        }
        let listeners = lock(&filter.state).listeners.snapshot();
        deliver(&listeners, event)
    }

    fn on_completed(&self) {
        let Some(filter) = self.filter.upgrade() else {
            return;
        };
        let (listeners, upstream) = {
            let mut state = lock(&filter.state);
            if state.listeners.completed {
                return;
            }
            (state.listeners.complete(), state.upstream.take())
        };
        drop(upstream);
        notify_completed(listeners);
    }
}

/// A filtered view over another render event source.
///
/// The upstream subscription is shared and reference counted: it is created
/// when the first downstream observer subscribes and released when the last
/// one leaves.
#[derive(Clone)]
pub struct FilteredRenderEvents {
    inner: Arc<FilterInner>,
}

impl FilteredRenderEvents {
    fn new(upstream: Arc<dyn RenderEventSource>, predicate: EventPredicate) -> Self {
        Self {
            inner: Arc::new(FilterInner {
                upstream,
                predicate,
                state: Mutex::new(FilterState::default()),
            }),
        }
    }

    pub fn filter<P>(&self, predicate: P) -> FilteredRenderEvents
    where
        P: Fn(&RenderEvent) -> bool + Send + Sync + 'static,
    {
        FilteredRenderEvents::new(Arc::new(self.clone()), Arc::new(predicate))
    }

    /// Whether this stream currently holds a subscription on its upstream.
    pub fn is_connected(&self) -> bool {
        lock(&self.inner.state).upstream.is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.state).listeners.observers.len()
    }

    fn release(filter: &Arc<FilterInner>, id: u64) {
        let upstream = {
            let mut state = lock(&filter.state);
            state.listeners.remove(id);
            if state.listeners.observers.is_empty() {
                state.upstream.take()
            } else {
                None
            }
        };
        drop(upstream);
    }
}

impl RenderEventSource for FilteredRenderEvents {
    fn subscribe(&self, observer: Arc<dyn RenderEventObserver>) -> Subscription {
        let (id, connect) = {
            let mut state = lock(&self.inner.state);
            if state.listeners.completed {
                (None, false)
            } else {
                let connect = state.upstream.is_none();
                (Some(state.listeners.add(Arc::clone(&observer))), connect)
            }
        };
        let Some(id) = id else {
            notify_completed(vec![observer]);
            return Subscription::inert();
        };

        if connect {
            // Subscribing upstream may complete this stream synchronously, so
            // the state lock must not be held here.
            let forwarder: Arc<dyn RenderEventObserver> = Arc::new(FilterForwarder {
                filter: Arc::downgrade(&self.inner),
            });
            let upstream = self.inner.upstream.subscribe(forwarder);
            let surplus = {
                let mut state = lock(&self.inner.state);
                if state.upstream.is_none()
                    && !state.listeners.completed
                    && !state.listeners.observers.is_empty()
                {
                    state.upstream = Some(upstream);
                    None
                } else {
                    Some(upstream)
                }
            };
            drop(surplus);
        }

        let filter = Arc::clone(&self.inner);
        Subscription::new(move || FilteredRenderEvents::release(&filter, id))
    }
}

impl fmt::Debug for FilteredRenderEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("FilteredRenderEvents")
            .field("subscribers", &state.listeners.observers.len())
            .field("connected", &state.upstream.is_some())
            .finish()
    }
}
