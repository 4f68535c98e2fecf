use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::effects::filter::{Filter, FilterCore};
use crate::effects::transition::{Transition, TransitionCore};
use crate::engine;
use crate::foundation::core::{ConnectStatus, ServiceId, ServiceType, keys};
use crate::foundation::error::{EngineError, EngineResult};
use crate::foundation::profile::Profile;
use crate::frame::frame::Frame;
use crate::producer::producer::{Producer, ProducerClass};
use crate::properties::bag::{Properties, Value};
use crate::properties::events::{Event, EventKind, Events};
use crate::service::cache::{self, CacheItem};

/// Variant payload of a service.
pub(crate) enum ServiceKind {
    /// Forwards to its inputs.
    Base,
    Producer(ProducerClass),
    Filter(FilterCore),
    Transition(TransitionCore),
}

#[derive(Default)]
struct Wiring {
    inputs: Vec<Option<Service>>,
    consumer: Option<WeakService>,
    filters: Vec<Filter>,
}

pub(crate) struct ServiceInner {
    id: ServiceId,
    properties: Properties,
    events: Events,
    wiring: Mutex<Wiring>,
    lock: Mutex<()>,
    profile: Mutex<Option<Arc<Profile>>>,
    kind: ServiceKind,
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        self.events.block();
        let wiring = std::mem::take(self.wiring.get_mut().unwrap_or_else(|e| e.into_inner()));
        for filter in &wiring.filters {
            filter.service().events().disconnect_owner(self.id);
        }
        let inputs = wiring.inputs.iter().flatten().count();
        drop(wiring);
        cache::purge(self.id);
        tracing::trace!(id = %self.id, inputs, "service closed");
    }
}

/// Shared handle to a graph node.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

/// Non-owning service reference.
#[derive(Clone, Default)]
pub struct WeakService {
    inner: Weak<ServiceInner>,
}

impl WeakService {
    pub fn upgrade(&self) -> Option<Service> {
        self.inner.upgrade().map(|inner| Service { inner })
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.inner.id)
            .field("type", &self.identify())
            .finish()
    }
}

impl Default for Service {
    fn default() -> Self {
        Self::new()
    }
}

impl Service {
    /// A base service: forwards `get_frame` to its inputs.
    pub fn new() -> Self {
        Self::with_kind(ServiceKind::Base)
    }

    pub(crate) fn with_kind(kind: ServiceKind) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                id: ServiceId::next(),
                properties: Properties::new(),
                events: Events::new(),
                wiring: Mutex::new(Wiring::default()),
                lock: Mutex::new(()),
                profile: Mutex::new(None),
                kind,
            }),
        }
    }

    pub fn id(&self) -> ServiceId {
        self.inner.id
    }

    pub(crate) fn kind(&self) -> &ServiceKind {
        &self.inner.kind
    }

    /// Raw attribute access; writes here do not notify listeners.
    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    pub fn events(&self) -> &Events {
        &self.inner.events
    }

    /// Store an attribute and fire `property-changed`.
    pub fn set_property(&self, key: &str, value: impl Into<Value>) {
        self.inner.properties.set(key, value);
        self.fire(&Event::PropertyChanged(key.to_string()));
    }

    pub fn fire(&self, event: &Event) {
        self.inner.events.fire(event);
    }

    pub fn downgrade(&self) -> WeakService {
        WeakService {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Service) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    fn wiring(&self) -> MutexGuard<'_, Wiring> {
        self.inner.wiring.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Per-service mutual exclusion held across frame production.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn profile(&self) -> Arc<Profile> {
        self.inner
            .profile
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(engine::default_profile)
    }

    pub fn set_profile(&self, profile: Arc<Profile>) {
        *self.inner.profile.lock().unwrap_or_else(|e| e.into_inner()) = Some(profile);
    }

    pub(crate) fn explicit_profile(&self) -> Option<Arc<Profile>> {
        self.inner
            .profile
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn identify(&self) -> ServiceType {
        let props = &self.inner.properties;
        let resource = props.get_str(keys::RESOURCE);
        match resource.as_deref() {
            Some("<playlist>") => return ServiceType::Playlist,
            Some("<tractor>") => return ServiceType::Tractor,
            Some("<multitrack>") => return ServiceType::Multitrack,
            _ => {}
        }
        match props.get_str(keys::MLT_TYPE).as_deref() {
            Some("producer") => ServiceType::Producer,
            Some("filter") => ServiceType::Filter,
            Some("transition") => ServiceType::Transition,
            Some("consumer") => ServiceType::Consumer,
            _ => ServiceType::Unknown,
        }
    }

    /// Wire `producer` into input slot `index` (-1 means 0).
    pub fn connect_producer(&self, producer: &Service, index: i32) -> EngineResult<ConnectStatus> {
        if producer.ptr_eq(self) {
            return Err(EngineError::connection(format!(
                "service {} cannot consume itself",
                self.id()
            )));
        }
        let index = if index == -1 { 0 } else { index };
        let slot = usize::try_from(index).map_err(|_| {
            EngineError::invalid_index(index, self.input_count())
        })?;
        let previous = {
            let mut wiring = self.wiring();
            if wiring.inputs.iter().flatten().any(|s| s.ptr_eq(producer)) {
                return Ok(ConnectStatus::AlreadyConnected);
            }
            if slot >= wiring.inputs.len() {
                if slot >= wiring.inputs.capacity() {
                    wiring.inputs.try_reserve(slot + 10)?;
                }
                wiring.inputs.resize(slot + 1, None);
            }
            wiring.inputs[slot].replace(producer.clone())
        };
        producer.set_consumer(Some(self.downgrade()));
        if let Some(previous) = previous {
            previous.release_consumer(self);
        }
        tracing::debug!(consumer = %self.id(), producer = %producer.id(), slot, "connected");
        Ok(ConnectStatus::Connected)
    }

    /// Insert `producer` at `index`, shifting later inputs up.
    pub fn insert_producer(&self, producer: &Service, index: i32) -> EngineResult<ConnectStatus> {
        let index = if index == -1 { 0 } else { index };
        let slot = usize::try_from(index).map_err(|_| {
            EngineError::invalid_index(index, self.input_count())
        })?;
        {
            let mut wiring = self.wiring();
            if slot < wiring.inputs.len() {
                if wiring.inputs.iter().flatten().any(|s| s.ptr_eq(producer)) {
                    return Ok(ConnectStatus::AlreadyConnected);
                }
                wiring.inputs.try_reserve(1)?;
                wiring.inputs.insert(slot, Some(producer.clone()));
            } else {
                drop(wiring);
                return self.connect_producer(producer, index);
            }
        }
        producer.set_consumer(Some(self.downgrade()));
        Ok(ConnectStatus::Connected)
    }

    /// Release input `index` and compact the following inputs.
    pub fn disconnect_producer(&self, index: usize) -> EngineResult<()> {
        let removed = {
            let mut wiring = self.wiring();
            if index >= wiring.inputs.len() {
                return Err(EngineError::invalid_index(index as i64, wiring.inputs.len()));
            }
            wiring.inputs.remove(index)
        };
        if let Some(removed) = removed {
            removed.release_consumer(self);
        }
        Ok(())
    }

    pub fn disconnect_all_producers(&self) {
        let inputs = std::mem::take(&mut self.wiring().inputs);
        for input in inputs.into_iter().flatten() {
            input.release_consumer(self);
        }
    }

    fn set_consumer(&self, consumer: Option<WeakService>) {
        self.wiring().consumer = consumer;
    }

    fn release_consumer(&self, consumer: &Service) {
        let mut wiring = self.wiring();
        let points_here = wiring
            .consumer
            .as_ref()
            .and_then(WeakService::upgrade)
            .is_some_and(|c| c.ptr_eq(consumer));
        if points_here {
            wiring.consumer = None;
        }
    }

    pub fn consumer(&self) -> Option<Service> {
        self.wiring().consumer.as_ref().and_then(WeakService::upgrade)
    }

    /// Last-most input.
    pub fn producer(&self) -> Option<Service> {
        self.wiring().inputs.last().cloned().flatten()
    }

    /// First input.
    pub fn get_producer(&self) -> Option<Service> {
        self.wiring().inputs.first().cloned().flatten()
    }

    pub fn input(&self, index: usize) -> Option<Service> {
        self.wiring().inputs.get(index).cloned().flatten()
    }

    pub fn input_count(&self) -> usize {
        self.wiring().inputs.len()
    }

    pub fn input_capacity(&self) -> usize {
        self.wiring().inputs.capacity()
    }

    pub(crate) fn replace_input(&self, index: usize, producer: Option<Service>) {
        let previous = {
            let mut wiring = self.wiring();
            match wiring.inputs.get_mut(index) {
                Some(slot) => std::mem::replace(slot, producer.clone()),
                None => return,
            }
        };
        if let Some(p) = &producer {
            p.set_consumer(Some(self.downgrade()));
        }
        drop(previous);
    }

    /// Attach `filter` to the end of the filter list.
    pub fn attach(&self, filter: &Filter) -> EngineResult<()> {
        {
            let mut wiring = self.wiring();
            if wiring.filters.iter().any(|f| f.ptr_eq(filter)) {
                return Err(EngineError::connection(format!(
                    "filter {} already attached to {}",
                    filter.service().id(),
                    self.id()
                )));
            }
            wiring.filters.try_reserve(1)?;
            wiring.filters.push(filter.clone());
        }
        self.fire(&Event::ServiceChanged);
        filter.service().fire(&Event::ServiceChanged);

        let host = self.downgrade();
        filter
            .service()
            .events()
            .listen(Some(self.id()), EventKind::ServiceChanged, move |_| {
                if let Some(host) = host.upgrade() {
                    host.fire(&Event::ServiceChanged);
                }
            });
        let host = self.downgrade();
        filter
            .service()
            .events()
            .listen(Some(self.id()), EventKind::PropertyChanged, move |event| {
                if let Some(host) = host.upgrade() {
                    host.fire(event);
                }
            });
        Ok(())
    }

    pub fn detach(&self, filter: &Filter) -> EngineResult<()> {
        let removed = {
            let mut wiring = self.wiring();
            let Some(pos) = wiring.filters.iter().position(|f| f.ptr_eq(filter)) else {
                return Err(EngineError::connection(format!(
                    "filter {} is not attached to {}",
                    filter.service().id(),
                    self.id()
                )));
            };
            wiring.filters.remove(pos)
        };
        removed.service().events().disconnect_owner(self.id());
        self.fire(&Event::ServiceChanged);
        Ok(())
    }

    pub fn filter(&self, index: usize) -> Option<Filter> {
        self.wiring().filters.get(index).cloned()
    }

    pub fn filter_count(&self) -> usize {
        self.wiring().filters.len()
    }

    pub(crate) fn filters(&self) -> Vec<Filter> {
        self.wiring().filters.clone()
    }

    /// Run the attached filters over `frame`.
    ///
    /// `depth` is 0 for a direct application and grows by one for each nested filter
    /// list; services flagged `_filter_private` only run their filters at depth 0.
    pub fn apply_filters(&self, frame: &Frame, depth: u32) {
        let props = &self.inner.properties;
        if depth != 0 && props.flag(keys::FILTER_PRIVATE) {
            return;
        }
        let filters = self.filters();
        if filters.is_empty() {
            return;
        }
        let position = frame.position();
        let host_in = props.get_position(keys::IN);
        let host_out = props.get_position(keys::OUT);
        for filter in filters {
            if filter.is_disabled() {
                continue;
            }
            let (f_in, f_out) = (filter.get_in(), filter.get_out());
            let in_window =
                (f_in == 0 && f_out == 0) || (position >= f_in && (position <= f_out || f_out == 0));
            if !in_window {
                continue;
            }
            let fp = frame.properties();
            fp.set(keys::IN, if f_in == 0 { host_in } else { f_in });
            fp.set(keys::OUT, if f_out == 0 { host_out } else { f_out });
            let _ = filter.process(frame.clone());
            filter.service().apply_filters(frame, depth + 1);
        }
    }

    fn produce(&self, index: i32) -> EngineResult<Frame> {
        match &self.inner.kind {
            ServiceKind::Base => {
                let input = usize::try_from(index).ok().and_then(|i| self.input(i));
                Ok(match input {
                    Some(input) => input.get_frame(index),
                    None => Frame::new(Some(self)),
                })
            }
            ServiceKind::Producer(_) => Producer::wrap(self.clone()).produce(index),
            ServiceKind::Filter(_) => Filter::wrap(self.clone()).produce(index),
            ServiceKind::Transition(_) => Transition::wrap(self.clone()).produce(index),
        }
    }

    /// Produce the frame for input `index`, with the attached filters applied.
    ///
    /// Never fails: a variant error is logged and replaced with a placeholder frame.
    pub fn get_frame(&self, index: i32) -> Frame {
        let _guard = self.lock();
        let as_producer = matches!(self.identify(), ServiceType::Producer)
            .then(|| Producer::wrap(self.clone()));
        let position = as_producer.as_ref().map(|p| p.position());

        let frame = match self.produce(index) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(service = %self.id(), index, error = %err, "frame production failed");
                return Frame::new(Some(self));
            }
        };

        let props = &self.inner.properties;
        let in_point = props.get_position(keys::IN);
        let out_point = props.get_position(keys::OUT);
        if in_point >= 0 && out_point > 0 {
            frame.properties().set(keys::IN, in_point);
            frame.properties().set(keys::OUT, out_point);
        }
        self.apply_filters(&frame, 1);
        frame.push_visited(self);

        if let (Some(producer), Some(position)) = (as_producer, position) {
            if props.flag(keys::NEED_PREVIOUS_NEXT) {
                let resume = producer.position();
                producer.seek(position - 1);
                if let Ok(previous) = self.produce(index) {
                    frame.properties().set(keys::PREVIOUS_FRAME, previous);
                }
                producer.seek(position + 1);
                if let Ok(next) = self.produce(index) {
                    frame.properties().set(keys::NEXT_FRAME, next);
                }
                producer.seek(resume);
            }
        }
        frame
    }

    pub fn cache_put(&self, name: &str, item: CacheItem) {
        cache::put(name, self.id(), item);
    }

    pub fn cache_get(&self, name: &str) -> Option<CacheItem> {
        cache::get(name, self.id())
    }

    pub fn cache_set_size(&self, name: &str, size: usize) {
        cache::set_size(name, size);
    }

    pub fn cache_get_size(&self, name: &str) -> usize {
        cache::get_size(name)
    }

    /// Drop every cached item owned by this service.
    pub fn cache_purge(&self) {
        cache::purge(self.id());
    }
}

#[cfg(test)]
#[path = "../../tests/unit/service/service.rs"]
mod tests;
