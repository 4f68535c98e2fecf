use std::fmt;
use std::sync::Arc;

use crate::effects::filter::Filter;
use crate::effects::transition::Transition;
use crate::foundation::core::{ConnectStatus, HIDE_AUDIO, HIDE_VIDEO, ServiceId, ServiceType, keys};
use crate::foundation::error::{EngineError, EngineResult};
use crate::frame::frame::Frame;
use crate::multitrack::multitrack::Multitrack;
use crate::producer::producer::{Producer, ProducerClass};
use crate::properties::bag::Properties;
use crate::properties::events::EventKind;
use crate::service::service::Service;
use crate::tractor::field::Field;

pub(crate) struct TractorState {
    multitrack: Option<Multitrack>,
    field: Option<Field>,
}

/// Pulls one frame per track from its tip and fuses them into one output frame.
#[derive(Clone)]
pub struct Tractor {
    producer: Producer,
    state: Arc<TractorState>,
}

impl fmt::Debug for Tractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tractor")
            .field("id", &self.id())
            .field("tracks", &self.state.multitrack.as_ref().map(Multitrack::count))
            .field("length", &self.producer.get_length())
            .finish()
    }
}

impl Default for Tractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Tractor {
    /// A tractor owning a multitrack and the field that chains services on top of it.
    pub fn new() -> Self {
        let multitrack = Multitrack::new();
        let field = Field::new(multitrack.clone());
        let tractor = Self::with_state(TractorState {
            multitrack: Some(multitrack.clone()),
            field: Some(field.clone()),
        });
        tractor.properties().set(keys::OUT, 0);
        if let Err(err) = field.bind(tractor.service()) {
            tracing::warn!(tractor = %tractor.id(), error = %err, "field not bound");
        }

        let weak = tractor.service().downgrade();
        multitrack.service().events().listen(
            Some(tractor.id()),
            EventKind::ProducerChanged,
            move |_| {
                let tractor = weak
                    .upgrade()
                    .and_then(|s| Producer::from_service(&s))
                    .and_then(|p| Tractor::from_producer(&p));
                if let Some(tractor) = tractor {
                    tractor.refresh();
                }
            },
        );
        tractor
    }

    /// A tractor without a multitrack; it forwards to whatever gets connected.
    pub fn bare() -> Self {
        Self::with_state(TractorState {
            multitrack: None,
            field: None,
        })
    }

    fn with_state(state: TractorState) -> Self {
        let state = Arc::new(state);
        let producer = Producer::with_class(ProducerClass::Tractor(Arc::clone(&state)));
        let props = producer.properties();
        props.set(keys::RESOURCE, "<tractor>");
        props.set(keys::MLT_SERVICE, "tractor");
        props.set(keys::IN, 0);
        props.set(keys::OUT, -1);
        props.set(keys::LENGTH, 0);
        Self { producer, state }
    }

    pub(crate) fn from_parts(producer: Producer, state: Arc<TractorState>) -> Self {
        Self { producer, state }
    }

    pub fn from_producer(producer: &Producer) -> Option<Self> {
        match producer.class() {
            Some(ProducerClass::Tractor(state)) => {
                Some(Self::from_parts(producer.clone(), Arc::clone(state)))
            }
            _ => None,
        }
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn service(&self) -> &Service {
        self.producer.service()
    }

    pub fn properties(&self) -> &Properties {
        self.producer.properties()
    }

    pub fn id(&self) -> ServiceId {
        self.producer.id()
    }

    pub fn multitrack(&self) -> Option<Multitrack> {
        self.state.multitrack.clone()
    }

    pub fn field(&self) -> Option<Field> {
        self.state.field.clone()
    }

    fn require_multitrack(&self) -> EngineResult<&Multitrack> {
        self.state
            .multitrack
            .as_ref()
            .ok_or_else(|| EngineError::connection(format!("tractor {} has no multitrack", self.id())))
    }

    pub fn track(&self, index: usize) -> Option<Producer> {
        self.state.multitrack.as_ref()?.track(index)
    }

    /// Make `service` the tip the tractor pulls from.
    pub fn connect(&self, service: &Service) -> EngineResult<ConnectStatus> {
        self.service().connect_producer(service, 0)
    }

    pub fn set_track(&self, producer: &Producer, index: usize) -> EngineResult<ConnectStatus> {
        self.require_multitrack()?.connect(producer, index)
    }

    // Filters and transitions planted between the tractor and its multitrack, tip first.
    fn chain(&self) -> Vec<Service> {
        let mut chain = Vec::new();
        let mut next = self.service().producer();
        while let Some(service) = next {
            if !matches!(service.identify(), ServiceType::Filter | ServiceType::Transition) {
                break;
            }
            next = service.producer();
            chain.push(service);
        }
        chain
    }

    fn renumber(&self, index: usize, shift: impl Fn(i32) -> i32) {
        let index = i32::try_from(index).unwrap_or(i32::MAX);
        for service in self.chain() {
            if let Some(transition) = Transition::from_service(&service) {
                let (a_track, b_track) = (transition.a_track(), transition.b_track());
                if a_track >= index || b_track >= index {
                    let a_track = if a_track >= index { shift(a_track) } else { a_track };
                    let b_track = if b_track >= index { shift(b_track) } else { b_track };
                    transition.set_tracks(a_track, b_track);
                }
            } else if let Some(filter) = Filter::from_service(&service) {
                let track = filter.track();
                if track >= index {
                    filter.properties().set(keys::TRACK, shift(track));
                }
            }
        }
    }

    /// Insert a track at `index`; planted services on or above it move up one track.
    pub fn insert_track(&self, producer: &Producer, index: usize) -> EngineResult<()> {
        self.require_multitrack()?.insert(producer, index)?;
        self.renumber(index, |track| track + 1);
        Ok(())
    }

    /// Remove track `index`; planted services on or above it move down one track.
    pub fn remove_track(&self, index: usize) -> EngineResult<()> {
        self.require_multitrack()?.disconnect(index)?;
        self.renumber(index, |track| (track - 1).max(0));
        Ok(())
    }

    /// Take `in`/`out`/`length` from the multitrack.
    pub fn refresh(&self) {
        let Some(multitrack) = &self.state.multitrack else {
            return;
        };
        {
            let _multitrack_quiet = multitrack.service().events().blocked();
            let _quiet = self.service().events().blocked();
            multitrack.refresh();
            self.service().set_property(keys::IN, 0);
            self.service()
                .set_property(keys::OUT, multitrack.producer().get_out());
        }
        self.service()
            .set_property(keys::LENGTH, multitrack.producer().get_length());
    }

    #[tracing::instrument(level = "trace", skip_all, fields(tractor = %self.id(), position = self.producer.frame()))]
    fn harvest(&self, tip: &Service, multitrack: &Multitrack) -> Frame {
        let target = multitrack.producer();
        target.seek(self.producer.frame());
        target.set_speed(self.producer.speed());

        let output = Frame::new(Some(self.service()));
        let op = output.properties();
        let mut audio: Option<Frame> = None;
        let mut video: Option<Frame> = None;
        let mut first_video: Option<Frame> = None;
        let mut image_count = 0;

        for index in 0.. {
            let temp = tip.get_frame(index);
            let tp = temp.properties();
            for (name, value) in tp.with_prefix(keys::META_PREFIX) {
                if !op.contains(&name) {
                    op.set(&name, value);
                }
            }
            if output.convert_image().is_none() {
                if let Some(convert) = temp.convert_image() {
                    output.set_convert_image(Some(convert));
                }
            }
            if output.convert_audio().is_none() {
                if let Some(convert) = temp.convert_audio() {
                    output.set_convert_audio(Some(convert));
                }
            }

            let done = tp.flag(keys::LAST_TRACK);
            if tp.flag(keys::FX_CUT) {
                let mut hide = 0;
                if video.is_none() {
                    hide |= HIDE_VIDEO;
                }
                if audio.is_none() {
                    hide |= HIDE_AUDIO;
                }
                tp.set(keys::HIDE, hide);
            }
            op.set(&format!("mlt_tractor {}_{index}", self.id()), temp.clone());
            if done {
                break;
            }

            let hide = tp.get_int(keys::HIDE);
            if !temp.is_test_audio() && hide & HIDE_AUDIO == 0 {
                if let Some(previous) = audio.take() {
                    temp.push_front_audio_frame(previous);
                }
                audio = Some(temp.clone());
            }
            if !temp.is_test_card() && hide & HIDE_VIDEO == 0 {
                if let Some(previous) = video.take() {
                    temp.push_front_frame(previous);
                }
                video = Some(temp.clone());
                first_video.get_or_insert_with(|| temp.clone());
                image_count += 1;
                tp.set(keys::IMAGE_COUNT, image_count);
                image_count = 1;
            }
        }

        let has_audio = audio.is_some();
        let has_video = video.is_some();
        if let Some(audio) = audio {
            output.push_audio_frame(audio);
        }
        if let (Some(video), Some(first)) = (video, first_video) {
            output.push_frame(video);
            let fp = first.properties();
            op.set(keys::WIDTH, fp.get_int(keys::WIDTH));
            op.set(keys::HEIGHT, fp.get_int(keys::HEIGHT));
            op.pass_list(fp, "meta.media.width, meta.media.height");
            op.set(keys::PROGRESSIVE, fp.get_int(keys::PROGRESSIVE));
            op.set(keys::ASPECT_RATIO, fp.get_double(keys::ASPECT_RATIO));
            op.set(keys::IMAGE_COUNT, image_count);
            if let Some(source) = first.original_producer() {
                op.set(keys::PRODUCER, source.service().downgrade());
            }
        }
        output.set_position(self.producer.frame());
        op.set(keys::TEST_AUDIO, !has_audio);
        op.set(keys::TEST_IMAGE, !has_video);
        tracing::trace!(audio = has_audio, video = has_video, "harvested");
        output
    }

    pub(crate) fn produce(&self, index: i32) -> EngineResult<Frame> {
        let tip = self.service().get_producer();
        let frame = match (index, tip) {
            (0, Some(tip)) => {
                let frame = match &self.state.multitrack {
                    Some(multitrack) => self.harvest(&tip, multitrack),
                    None => {
                        tracing::warn!(tractor = %self.id(), "tractor without a multitrack");
                        tip.get_frame(index)
                    }
                };
                self.producer.prepare_next();
                frame
            }
            _ => Frame::new(Some(self.service())),
        };
        Ok(frame)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tractor/tractor.rs"]
mod tests;
