//! Simulated capture session and location provider.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::system::channel::EventChannel;
use crate::system::collaborators::{LocationProvider, Session};
use crate::system::messages::SessionEvent;

use super::call_log::{Call, CallLog};

/// Session whose lifecycle is driven by hand.
#[derive(Debug, Default)]
pub struct SimulatedSession {
    events: EventChannel<SessionEvent>,
}

impl SimulatedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.events.publish(&SessionEvent::Paused);
    }

    pub fn resume(&self) {
        self.events.publish(&SessionEvent::Resumed);
    }

    pub fn deinitialize(&self) {
        self.events.publish(&SessionEvent::Deinitialized);
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }
}

impl Session for SimulatedSession {
    fn events(&self) -> &EventChannel<SessionEvent> {
        &self.events
    }
}

/// Location provider that only records start/stop.
#[derive(Debug)]
pub struct SimulatedLocationProvider {
    log: CallLog,
    running: AtomicBool,
}

impl SimulatedLocationProvider {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl LocationProvider for SimulatedLocationProvider {
    fn start(&self) {
        debug!("Location provider started");
        self.running.store(true, Ordering::SeqCst);
        self.log.push(Call::LocationStart);
    }

    fn stop(&self) {
        debug!("Location provider stopped");
        self.running.store(false, Ordering::SeqCst);
        self.log.push(Call::LocationStop);
    }
}
