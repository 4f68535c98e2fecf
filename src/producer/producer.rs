use std::fmt;
use std::sync::Arc;

use crate::effects::filter::Filter;
use crate::engine;
use crate::foundation::core::{EofPolicy, Position, ServiceId, keys};
use crate::foundation::error::EngineResult;
use crate::frame::frame::Frame;
use crate::multitrack::multitrack::{Multitrack, MultitrackState};
use crate::playlist::playlist::{Playlist, PlaylistState};
use crate::properties::bag::Properties;
use crate::properties::events::{Event, EventKind};
use crate::service::service::{Service, ServiceKind};
use crate::tractor::tractor::{Tractor, TractorState};

/// Frame source implemented by producer plugins.
///
/// The caller stamps the producer position on the returned frame and advances the
/// producer afterwards.
pub trait ProducerHook: Send + Sync {
    fn get_frame(&self, producer: &Producer, index: i32) -> EngineResult<Frame>;
}

impl<F> ProducerHook for F
where
    F: Fn(&Producer, i32) -> EngineResult<Frame> + Send + Sync,
{
    fn get_frame(&self, producer: &Producer, index: i32) -> EngineResult<Frame> {
        self(producer, index)
    }
}

pub(crate) enum ProducerClass {
    Plain(Option<Box<dyn ProducerHook>>),
    Playlist(Arc<PlaylistState>),
    Multitrack(Arc<MultitrackState>),
    Tractor(Arc<TractorState>),
}

/// A service with a timeline: position, in/out window, speed and end-of-stream policy.
#[derive(Clone)]
pub struct Producer {
    service: Service,
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("id", &self.id())
            .field("in", &self.get_in())
            .field("out", &self.get_out())
            .field("position", &self.position())
            .finish()
    }
}

impl Default for Producer {
    fn default() -> Self {
        Self::new()
    }
}

impl Producer {
    /// A producer without a hook; it yields test frames.
    pub fn new() -> Self {
        Self::with_class(ProducerClass::Plain(None))
    }

    pub fn with_hook(hook: impl ProducerHook + 'static) -> Self {
        Self::with_class(ProducerClass::Plain(Some(Box::new(hook))))
    }

    pub(crate) fn with_class(class: ProducerClass) -> Self {
        let service = Service::with_kind(ServiceKind::Producer(class));
        let length = engine::default_producer_length();
        let props = service.properties();
        props.set(keys::MLT_TYPE, "producer");
        props.set(keys::POSITION, 0);
        props.set(keys::FRAME, 0);
        props.set(keys::SPEED, 1.0);
        props.set(keys::IN, 0);
        props.set(keys::OUT, (length - 1).max(0));
        props.set(keys::LENGTH, length);
        props.set(keys::EOF, EofPolicy::Pause.as_str());
        props.set(keys::RESOURCE, "<producer>");
        let producer = Self { service };
        producer.listen_for_changes();
        producer
    }

    // Timeline edits and filter changes are announced on the cut parent.
    fn listen_for_changes(&self) {
        let owner = Some(self.id());
        let weak = self.service.downgrade();
        self.service
            .events()
            .listen(owner, EventKind::PropertyChanged, move |event| {
                let Event::PropertyChanged(name) = event else {
                    return;
                };
                if !matches!(name.as_str(), keys::IN | keys::OUT | keys::LENGTH) {
                    return;
                }
                if let Some(service) = weak.upgrade() {
                    Producer::wrap(service)
                        .cut_parent()
                        .service()
                        .fire(&Event::ProducerChanged);
                }
            });
        let weak = self.service.downgrade();
        self.service
            .events()
            .listen(owner, EventKind::ServiceChanged, move |_| {
                if let Some(service) = weak.upgrade() {
                    Producer::wrap(service)
                        .cut_parent()
                        .service()
                        .fire(&Event::ProducerChanged);
                }
            });
    }

    pub(crate) fn wrap(service: Service) -> Self {
        Self { service }
    }

    /// View `service` as a producer when it is one.
    pub fn from_service(service: &Service) -> Option<Self> {
        matches!(service.kind(), ServiceKind::Producer(_)).then(|| Self::wrap(service.clone()))
    }

    pub(crate) fn class(&self) -> Option<&ProducerClass> {
        match self.service.kind() {
            ServiceKind::Producer(class) => Some(class),
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

    pub fn ptr_eq(&self, other: &Producer) -> bool {
        self.service.ptr_eq(&other.service)
    }

    pub fn get_frame(&self, index: i32) -> Frame {
        self.service.get_frame(index)
    }

    pub fn attach(&self, filter: &Filter) -> EngineResult<()> {
        self.service.attach(filter)
    }

    pub fn detach(&self, filter: &Filter) -> EngineResult<()> {
        self.service.detach(filter)
    }

    pub fn filter(&self, index: usize) -> Option<Filter> {
        self.service.filter(index)
    }

    pub fn as_playlist(&self) -> Option<Playlist> {
        Playlist::from_producer(self)
    }

    pub fn as_multitrack(&self) -> Option<Multitrack> {
        Multitrack::from_producer(self)
    }

    pub fn as_tractor(&self) -> Option<Tractor> {
        Tractor::from_producer(self)
    }

    pub fn position(&self) -> Position {
        self.properties().get_position(keys::POSITION)
    }

    /// Absolute frame: position offset by the in point.
    pub fn frame(&self) -> Position {
        self.properties().get_position(keys::FRAME)
    }

    pub fn speed(&self) -> f64 {
        self.properties().get_double(keys::SPEED)
    }

    pub fn set_speed(&self, speed: f64) {
        self.properties().set(keys::SPEED, speed);
    }

    pub fn fps(&self) -> f64 {
        self.service.profile().fps()
    }

    pub fn get_in(&self) -> Position {
        self.properties().get_position(keys::IN)
    }

    pub fn get_out(&self) -> Position {
        self.properties().get_position(keys::OUT)
    }

    pub fn get_length(&self) -> Position {
        self.properties().get_position(keys::LENGTH)
    }

    pub fn get_playtime(&self) -> Position {
        self.get_out() - self.get_in() + 1
    }

    pub fn eof(&self) -> Option<EofPolicy> {
        EofPolicy::parse(self.properties().get_str(keys::EOF).as_deref())
    }

    pub fn set_eof(&self, policy: EofPolicy) {
        self.service.set_property(keys::EOF, policy.as_str());
    }

    pub fn is_cut(&self) -> bool {
        self.properties().flag(keys::CUT)
    }

    /// The producer this cut aliases, or `self` for a non-cut.
    pub fn cut_parent(&self) -> Producer {
        if self.is_cut() {
            if let Some(parent) = self.properties().get_service(keys::CUT_PARENT) {
                return Producer::wrap(parent);
            }
        }
        self.clone()
    }

    pub fn is_blank(&self) -> bool {
        self.cut_parent()
            .properties()
            .get_str(keys::RESOURCE)
            .is_some_and(|r| r == "blank")
    }

    /// True when this producer is the tractor of a playlist mix.
    pub fn is_mix(&self) -> bool {
        self.properties().get_service(keys::MIX).is_some()
    }

    pub fn seek(&self, position: Position) {
        let props = self.properties();
        let use_points = !props.flag(keys::IGNORE_POINTS);
        let eof = props.get_str(keys::EOF);

        if self.is_cut() {
            self.cut_parent().seek(position + self.get_in());
        }

        let playtime = self.get_playtime();
        let position = if position < 0 || playtime == 0 {
            0
        } else if use_points
            && matches!(eof.as_deref(), None | Some("pause"))
            && position >= playtime
        {
            self.set_speed(0.0);
            playtime - 1
        } else if use_points && eof.as_deref() == Some("loop") && position >= playtime {
            position % playtime
        } else {
            position
        };

        props.set(keys::POSITION, position);
        let base = if use_points { self.get_in() } else { 0 };
        props.set(keys::FRAME, base + position);
    }

    pub fn prepare_next(&self) {
        let speed = self.speed();
        if speed != 0.0 {
            self.seek(self.position() + speed as Position);
        }
    }

    /// Set the play window. `in` is written silently, the `out` write notifies.
    pub fn set_in_and_out(&self, in_point: Position, out_point: Position) {
        let props = self.properties();
        let length = self.get_length();
        let mut in_point = if in_point < 0 {
            0
        } else if in_point >= length {
            (length - 1).max(0)
        } else {
            in_point
        };
        let mut out_point = out_point;
        if self.is_blank() && out_point >= length {
            props.set(keys::LENGTH, out_point + 1);
        } else if out_point < 0 || out_point >= length {
            out_point = (length - 1).max(0);
        }
        if out_point < in_point {
            std::mem::swap(&mut in_point, &mut out_point);
        }
        self.set_window(in_point, out_point);
    }

    fn set_window(&self, in_point: Position, out_point: Position) {
        let events = self.service.events();
        events.block();
        self.service.set_property(keys::IN, in_point);
        events.unblock();
        self.service.set_property(keys::OUT, out_point);
    }

    /// Reduce to zero length (`in=0`, `out=-1`).
    pub fn clear(&self) {
        self.set_window(0, -1);
    }

    /// New producer aliasing the cut parent of `self` over `[in, out]`.
    pub fn cut(&self, in_point: Position, out_point: Position) -> Producer {
        let parent = self.cut_parent();
        let result = Producer::new();
        if let Some(profile) = self.service.explicit_profile() {
            result.service.set_profile(profile);
        }
        // A cut never announces its own edits; containers refresh explicitly.
        result.service.events().disconnect_owner(result.id());

        let parent_length = parent.get_length();
        let in_point = in_point.max(0);
        let out_point = if (out_point < 0 || out_point >= parent_length) && !self.is_blank() {
            (parent_length - 1).max(0)
        } else {
            out_point
        };

        let props = result.properties();
        props.set(keys::CUT, 1);
        props.set(keys::CUT_PARENT, parent.service.clone());
        props.set(keys::LENGTH, parent_length);
        props.set(
            keys::ASPECT_RATIO,
            parent.properties().get_double(keys::ASPECT_RATIO),
        );
        result.set_in_and_out(in_point, out_point);
        result
    }

    fn test_frame(&self) -> Frame {
        let frame = Frame::new(Some(&self.service));
        frame.set_position(self.position());
        frame.properties().set(keys::TEST_IMAGE, 1);
        frame.properties().set(keys::TEST_AUDIO, 1);
        self.prepare_next();
        frame
    }

    /// Frame production shared by every producer class.
    pub(crate) fn produce(&self, index: i32) -> EngineResult<Frame> {
        let frame = if !self.is_cut() {
            let speed = self.speed();
            let past_end =
                self.eof() == Some(EofPolicy::Continue) && self.position() > self.get_out();
            let frame = match self.class() {
                _ if past_end => self.test_frame(),
                Some(ProducerClass::Plain(Some(hook))) => {
                    let position = self.position();
                    let frame = hook.get_frame(self, index)?;
                    frame.set_position(position);
                    self.prepare_next();
                    frame
                }
                Some(ProducerClass::Playlist(state)) => {
                    Playlist::from_parts(self.clone(), Arc::clone(state)).produce(index)?
                }
                Some(ProducerClass::Multitrack(state)) => {
                    Multitrack::from_parts(self.clone(), Arc::clone(state)).produce(index)?
                }
                Some(ProducerClass::Tractor(state)) => {
                    Tractor::from_parts(self.clone(), Arc::clone(state)).produce(index)?
                }
                Some(ProducerClass::Plain(None)) | None => self.test_frame(),
            };
            let fp = frame.properties();
            fp.set(keys::SPEED, speed);
            fp.set(keys::TEST_AUDIO, frame.is_test_audio());
            fp.set(keys::TEST_IMAGE, frame.is_test_card());
            if frame.original_producer().is_none() {
                fp.set(keys::PRODUCER, self.service.downgrade());
            }
            frame
        } else {
            let speed = self.speed();
            let parent = self.cut_parent();
            parent.seek(self.get_in() + self.position());
            let frame = parent.service.get_frame(index);
            if frame
                .original_producer()
                .is_some_and(|p| p.ptr_eq(&parent))
            {
                frame
                    .properties()
                    .set(keys::PRODUCER, self.service.downgrade());
            }
            frame.properties().set(keys::SPEED, speed);
            self.prepare_next();
            frame
        };

        let fp = frame.properties();
        for (name, value) in self.properties().entries() {
            if name.starts_with(keys::META_PREFIX) {
                fp.set(&name, value);
            } else if let Some(stripped) = name.strip_prefix(keys::SET_PREFIX) {
                fp.set(stripped, value);
            }
        }
        Ok(frame)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/producer/producer.rs"]
mod tests;
