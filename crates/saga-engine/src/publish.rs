//! Event Publisher collaborator.
//!
//! Publishers run after a commit has landed. A failing publisher never
//! undoes the commit; the engine turns the error into a warning.

use saga_core::event::EngineEvent;
use std::sync::Mutex;

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &EngineEvent) -> anyhow::Result<()>;
}

/// Discards everything.
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event: &EngineEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Logs each event at info level.
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(&self, event: &EngineEvent) -> anyhow::Result<()> {
        tracing::info!(
            event = event.name(),
            campaign_id = %event.campaign_id,
            ts = %event.ts,
            "event published"
        );
        Ok(())
    }
}

/// Collects events in memory (for testing).
#[derive(Default)]
pub struct CollectPublisher {
    events: Mutex<Vec<EngineEvent>>,
}

impl CollectPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .map(|g| g.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Event names in publication order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.name()).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut g) = self.events.lock() {
            g.clear();
        }
    }
}

impl EventPublisher for CollectPublisher {
    fn publish(&self, event: &EngineEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("collect publisher mutex poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

/// Hands each event to every inner publisher, then reports the first
/// failure (if any).
#[derive(Default)]
pub struct FanoutPublisher {
    publishers: Vec<Box<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, publisher: impl EventPublisher + 'static) -> Self {
        self.publishers.push(Box::new(publisher));
        self
    }

    pub fn push(&mut self, publisher: Box<dyn EventPublisher>) {
        self.publishers.push(publisher);
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

impl EventPublisher for FanoutPublisher {
    fn publish(&self, event: &EngineEvent) -> anyhow::Result<()> {
        let mut first_err = None;
        for p in &self.publishers {
            if let Err(e) = p.publish(event) {
                tracing::warn!(event = event.name(), error = %e, "publisher failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<T: EventPublisher + ?Sized> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: &EngineEvent) -> anyhow::Result<()> {
        (**self).publish(event)
    }
}
