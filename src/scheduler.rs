// Periodic update scheduler
//
// The application owns one Scheduler and ticks it once per control cycle.
// Components are boxed and owned by the scheduler; removing one hands it
// back to the caller.

use std::time::Duration;

use tracing::debug;

/// A component that advances once per control cycle
pub trait Updatable: Send {
    fn update(&mut self, dt: Duration);
}

/// Handle returned by [`Scheduler::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

#[derive(Default)]
pub struct Scheduler {
    next_id: u64,
    components: Vec<(ComponentId, Box<dyn Updatable>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component; it will be updated after every component added before it
    pub fn register(&mut self, component: Box<dyn Updatable>) -> ComponentId {
        let id = ComponentId(self.next_id);
        self.next_id += 1;
        self.components.push((id, component));
        debug!("Registered component {:?} ({} total)", id, self.components.len());
        id
    }

    pub fn remove(&mut self, id: ComponentId) -> Option<Box<dyn Updatable>> {
        let index = self.components.iter().position(|(cid, _)| *cid == id)?;
        let (_, component) = self.components.remove(index);
        debug!("Removed component {:?}", id);
        Some(component)
    }

    /// Update every registered component in registration order
    pub fn tick(&mut self, dt: Duration) {
        for (_, component) in &mut self.components {
            component.update(dt);
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Updatable for Recorder {
        fn update(&mut self, _dt: Duration) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Box<dyn Updatable> {
        Box::new(Recorder {
            name,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn test_tick_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler.register(recorder("a", &log));
        scheduler.register(recorder("b", &log));

        scheduler.tick(Duration::from_millis(20));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_ids_unique_after_removal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        let a = scheduler.register(recorder("a", &log));
        assert!(scheduler.remove(a).is_some());
        let b = scheduler.register(recorder("b", &log));

        assert_ne!(a, b);
        assert!(scheduler.remove(a).is_none());
        assert_eq!(scheduler.len(), 1);

        scheduler.tick(Duration::from_millis(20));
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
    }
}
