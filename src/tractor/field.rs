//! The service chain between a tractor and its multitrack.
//!
//! Planting splices a filter or transition above the current tip and reconnects the
//! tractor to it, so services planted later see the output of earlier ones.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::effects::filter::Filter;
use crate::effects::transition::Transition;
use crate::foundation::core::ServiceType;
use crate::foundation::error::{EngineError, EngineResult};
use crate::multitrack::multitrack::Multitrack;
use crate::producer::producer::Producer;
use crate::properties::events::Event;
use crate::service::service::{Service, WeakService};
use crate::tractor::tractor::Tractor;

struct FieldState {
    tip: Mutex<Service>,
    multitrack: Multitrack,
    tractor: OnceLock<WeakService>,
}

#[derive(Clone)]
pub struct Field {
    state: Arc<FieldState>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("tip", &self.tip().id())
            .field("multitrack", &self.state.multitrack.id())
            .finish()
    }
}

impl Field {
    pub(crate) fn new(multitrack: Multitrack) -> Self {
        Self {
            state: Arc::new(FieldState {
                tip: Mutex::new(multitrack.service().clone()),
                multitrack,
                tractor: OnceLock::new(),
            }),
        }
    }

    /// Wire the tractor to the multitrack. Called once the tractor exists.
    pub(crate) fn bind(&self, tractor: &Service) -> EngineResult<()> {
        if self.state.tractor.set(tractor.downgrade()).is_err() {
            return Err(EngineError::connection("field is already bound to a tractor"));
        }
        tractor.connect_producer(self.state.multitrack.service(), 0)?;
        Ok(())
    }

    fn tip_slot(&self) -> MutexGuard<'_, Service> {
        self.state.tip.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Topmost service of the chain; the tractor pulls from it.
    pub fn tip(&self) -> Service {
        self.tip_slot().clone()
    }

    pub fn multitrack(&self) -> &Multitrack {
        &self.state.multitrack
    }

    pub fn tractor(&self) -> Option<Tractor> {
        let service = self.state.tractor.get()?.upgrade()?;
        Producer::from_service(&service).and_then(|p| Tractor::from_producer(&p))
    }

    fn tractor_service(&self) -> EngineResult<Service> {
        self.state
            .tractor
            .get()
            .and_then(WeakService::upgrade)
            .ok_or_else(|| EngineError::connection("field has no tractor"))
    }

    fn retip(&self, service: &Service) -> EngineResult<()> {
        let tractor = self.tractor_service()?;
        *self.tip_slot() = service.clone();
        tractor.connect_producer(service, 0)?;
        tracing::debug!(tractor = %tractor.id(), tip = %service.id(), "field tip moved");
        tractor.fire(&Event::ServiceChanged);
        Ok(())
    }

    /// Put `filter` on top of the chain, processing `track`.
    pub fn plant_filter(&self, filter: &Filter, track: i32) -> EngineResult<()> {
        let status = filter.connect(&self.tip(), track)?;
        if !status.is_connected() {
            return Err(EngineError::connection(format!(
                "filter {} is already planted",
                filter.id()
            )));
        }
        self.retip(filter.service())
    }

    /// Put `transition` on top of the chain, combining `a_track` and `b_track`.
    pub fn plant_transition(&self, transition: &Transition, a_track: i32, b_track: i32) -> EngineResult<()> {
        let status = transition.connect(&self.tip(), a_track, b_track)?;
        if !status.is_connected() {
            return Err(EngineError::connection(format!(
                "transition {} is already planted",
                transition.id()
            )));
        }
        self.retip(transition.service())
    }

    /// Take a planted service out of the chain by wiring its producer into its consumer.
    pub fn disconnect_service(&self, service: &Service) -> EngineResult<()> {
        let producer = service
            .producer()
            .ok_or_else(|| EngineError::connection(format!("service {} has no producer", service.id())))?;
        let consumer = service
            .consumer()
            .ok_or_else(|| EngineError::connection(format!("service {} has no consumer", service.id())))?;

        match consumer.identify() {
            ServiceType::Filter => {
                if let Some(filter) = Filter::from_service(&consumer) {
                    consumer.connect_producer(&producer, filter.track())?;
                }
            }
            ServiceType::Transition => {
                if let Some(transition) = Transition::from_service(&consumer) {
                    consumer.connect_producer(&producer, transition.a_track())?;
                }
            }
            ServiceType::Tractor => {
                *self.tip_slot() = producer.clone();
                consumer.connect_producer(&producer, 0)?;
            }
            _ => {}
        }
        self.tractor_service()?.fire(&Event::ServiceChanged);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tractor/field.rs"]
mod tests;
