use std::fmt;

use crate::foundation::core::{ConnectStatus, Position, ServiceId, keys};
use crate::foundation::error::EngineResult;
use crate::frame::frame::Frame;
use crate::properties::bag::Properties;
use crate::service::service::{Service, ServiceKind};

/// One-frame transform implemented by filter plugins.
///
/// Implementations usually push an image or audio op on the frame and return it.
pub trait FilterProcess: Send + Sync {
    fn process(&self, filter: &Filter, frame: Frame) -> Frame;
}

impl<F> FilterProcess for F
where
    F: Fn(&Filter, Frame) -> Frame + Send + Sync,
{
    fn process(&self, filter: &Filter, frame: Frame) -> Frame {
        self(filter, frame)
    }
}

pub(crate) struct FilterCore {
    process: Option<Box<dyn FilterProcess>>,
}

/// A service that transforms the frames of one track.
#[derive(Clone)]
pub struct Filter {
    service: Service,
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("id", &self.service.id())
            .field("track", &self.track())
            .field("in", &self.get_in())
            .field("out", &self.get_out())
            .finish()
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter {
    /// A filter without a hook; frames pass through unchanged.
    pub fn new() -> Self {
        Self::with_core(FilterCore { process: None })
    }

    pub fn with_process(process: impl FilterProcess + 'static) -> Self {
        Self::with_core(FilterCore {
            process: Some(Box::new(process)),
        })
    }

    fn with_core(core: FilterCore) -> Self {
        let service = Service::with_kind(ServiceKind::Filter(core));
        let props = service.properties();
        props.set(keys::MLT_TYPE, "filter");
        props.set(keys::UNIQUE_ID, service.id().0 as i64);
        props.set(keys::IN, 0);
        props.set(keys::OUT, 0);
        props.set(keys::TRACK, 0);
        Self { service }
    }

    pub(crate) fn wrap(service: Service) -> Self {
        Self { service }
    }

    pub fn from_service(service: &Service) -> Option<Self> {
        matches!(service.kind(), ServiceKind::Filter(_)).then(|| Self::wrap(service.clone()))
    }

    fn hook(&self) -> Option<&dyn FilterProcess> {
        match self.service.kind() {
            ServiceKind::Filter(core) => core.process.as_deref(),
            _ => None,
        }
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn properties(&self) -> &Properties {
        self.service.properties()
    }

    pub fn id(&self) -> ServiceId {
        self.service.id()
    }

    pub fn ptr_eq(&self, other: &Filter) -> bool {
        self.service.ptr_eq(&other.service)
    }

    pub fn is_disabled(&self) -> bool {
        self.properties().flag(keys::DISABLE)
    }

    pub fn get_in(&self) -> Position {
        self.properties().get_position(keys::IN)
    }

    pub fn get_out(&self) -> Position {
        self.properties().get_position(keys::OUT)
    }

    /// Track this filter processes when used as a graph node; -1 means every track.
    pub fn track(&self) -> i32 {
        i32::try_from(self.properties().get_int(keys::TRACK)).unwrap_or(0)
    }

    pub fn set_in_and_out(&self, in_point: Position, out_point: Position) {
        self.properties().set(keys::IN, in_point);
        self.properties().set(keys::OUT, out_point);
    }

    /// Wire `producer` into this filter, processing its track `index`.
    pub fn connect(&self, producer: &Service, index: i32) -> EngineResult<ConnectStatus> {
        let status = self.service.connect_producer(producer, index)?;
        if status.is_connected() {
            let props = self.properties();
            props.set(keys::IN, 0);
            props.set(keys::OUT, 0);
            props.set(keys::TRACK, index);
        }
        Ok(status)
    }

    /// Length of the window; 0 when open-ended.
    pub fn length(&self) -> Position {
        let (in_point, out_point) = (self.get_in(), self.get_out());
        if out_point > 0 { out_point - in_point + 1 } else { 0 }
    }

    /// Window length, falling back to the frame's producer window when open-ended.
    pub fn length_for(&self, frame: &Frame) -> Position {
        let (mut in_point, mut out_point) = (self.get_in(), self.get_out());
        if out_point == 0 {
            if let Some(producer) = frame.original_producer() {
                let producer = producer.cut_parent();
                in_point = producer.get_in();
                out_point = producer.get_out();
            }
        }
        if out_point > 0 { out_point - in_point + 1 } else { 0 }
    }

    fn position_key(&self) -> String {
        format!(
            "pos.{}",
            self.properties().get_int(keys::UNIQUE_ID)
        )
    }

    /// Position of `frame` relative to the filter in point, as recorded by [`Filter::process`].
    pub fn position(&self, frame: &Frame) -> Position {
        frame.properties().get_position(&self.position_key()) - self.get_in()
    }

    /// Fraction of the window covered at `frame`; 0 for an empty window.
    pub fn progress(&self, frame: &Frame) -> f64 {
        let length = self.length_for(frame);
        if length == 0 {
            return 0.0;
        }
        self.position(frame) as f64 / length as f64
    }

    pub fn process(&self, frame: Frame) -> Frame {
        frame
            .properties()
            .set(&self.position_key(), frame.position());
        match self.hook() {
            Some(hook) if !self.is_disabled() => hook.process(self, frame),
            _ => frame,
        }
    }

    pub(crate) fn produce(&self, index: i32) -> EngineResult<Frame> {
        let Some(producer) = self.service.producer() else {
            return Ok(Frame::new(Some(&self.service)));
        };
        let track = self.track();
        if index != track && track != -1 {
            return Ok(producer.get_frame(index));
        }
        let frame = producer.get_frame(index);
        let position = frame.position();
        let (in_point, out_point) = (self.get_in(), self.get_out());
        if position >= in_point && (out_point == 0 || position <= out_point) {
            Ok(self.process(frame))
        } else {
            Ok(frame)
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/filter.rs"]
mod tests;
