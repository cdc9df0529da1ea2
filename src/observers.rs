/// Observer registry for the runner's outward surface
///
/// Observers subscribe to named feeds (tick snapshots, dropped commands,
/// domain events) with plain callbacks. The tick-observer count doubles as
/// the snapshot pipeline's "anyone watching" signal.
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverEvent {
    Tick,
    CommandDropped,
    SimEvent,
}

impl ObserverEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObserverEvent::Tick => "tick",
            ObserverEvent::CommandDropped => "commandDropped",
            ObserverEvent::SimEvent => "simEvent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

type Callback = Box<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Registry {
    listeners: HashMap<ObserverEvent, Vec<(ObserverId, Callback)>>,
}

/// Cloneable handle shared between the runner (registration) and the
/// kernel (dispatch)
#[derive(Clone)]
pub struct ObserverHub {
    registry: Arc<RwLock<Registry>>,
    next_id: Arc<AtomicU64>,
    tick_observers: Arc<AtomicUsize>,
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverHub {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            tick_observers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn on(
        &self,
        event: ObserverEvent,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if event == ObserverEvent::Tick {
            self.tick_observers.fetch_add(1, Ordering::Relaxed);
        }
        let mut registry = self.registry.write().expect("observer registry poisoned");
        registry
            .listeners
            .entry(event)
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    pub fn off(&self, id: ObserverId) -> bool {
        let mut registry = self.registry.write().expect("observer registry poisoned");
        let mut removed = false;
        for (event, listeners) in registry.listeners.iter_mut() {
            let before = listeners.len();
            listeners.retain(|(listener_id, _)| *listener_id != id);
            if listeners.len() < before {
                removed = true;
                if *event == ObserverEvent::Tick {
                    self.tick_observers.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
        removed
    }

    pub fn emit(&self, event: ObserverEvent, payload: &Value) {
        let registry = self.registry.read().expect("observer registry poisoned");
        if let Some(listeners) = registry.listeners.get(&event) {
            for (_, callback) in listeners {
                callback(payload);
            }
        }
    }

    /// Shared counter consumed by the snapshot pipeline
    pub fn tick_observer_count(&self) -> Arc<AtomicUsize> {
        self.tick_observers.clone()
    }
}
