use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::engine;
use crate::foundation::core::{Position, keys};
use crate::foundation::error::EngineResult;
use crate::frame::media::{
    Audio, AudioFormat, AudioRequest, DEFAULT_AUDIO_CHANNELS, DEFAULT_AUDIO_FREQUENCY,
    DEFAULT_AUDIO_SAMPLES, Image, ImageFormat, ImageRequest,
};
use crate::producer::producer::Producer;
use crate::properties::bag::Properties;
use crate::service::service::{Service, WeakService};

/// Deferred image transform. It usually pulls the image below with [`Frame::get_image`].
pub type ImageOp = Box<dyn FnOnce(&Frame, &mut ImageRequest) -> EngineResult<Image> + Send>;
pub type AudioOp = Box<dyn FnOnce(&Frame, &mut AudioRequest) -> EngineResult<Audio> + Send>;

pub type ImageConverter =
    Arc<dyn Fn(&Frame, Image, ImageFormat) -> EngineResult<Image> + Send + Sync>;
pub type AudioConverter =
    Arc<dyn Fn(&Frame, Audio, AudioFormat) -> EngineResult<Audio> + Send + Sync>;

pub enum ImageEntry {
    Op(ImageOp),
    /// Take the image from another frame.
    Frame(Frame),
}

pub enum AudioEntry {
    Op(AudioOp),
    Frame(Frame),
}

/// Scratch stack values used by filters to hand state to their deferred ops.
#[derive(Clone)]
pub enum Scratch {
    Service(Service),
    Int(i64),
    Frame(Frame),
    Data(Arc<dyn Any + Send + Sync>),
}

#[derive(Default)]
struct Stacks {
    image: VecDeque<ImageEntry>,
    audio: VecDeque<AudioEntry>,
    scratch: Vec<Scratch>,
    visited: Vec<WeakService>,
}

#[derive(Default)]
struct Media {
    image: Option<Image>,
    alpha: Option<Arc<Vec<u8>>>,
    audio: Option<Audio>,
    convert_image: Option<ImageConverter>,
    convert_audio: Option<AudioConverter>,
}

pub(crate) struct FrameInner {
    properties: Properties,
    stacks: Mutex<Stacks>,
    media: Mutex<Media>,
    processing: AtomicBool,
}

impl Drop for FrameInner {
    fn drop(&mut self) {
        let stacks = std::mem::take(self.stacks.get_mut().unwrap_or_else(|e| e.into_inner()));
        let pending = stacks.image.len() + stacks.audio.len();
        if pending > 0 {
            tracing::trace!(pending, "frame dropped with undischarged entries");
        }
    }
}

/// Request-scoped media container with deferred image and audio stacks.
#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

#[derive(Clone)]
pub struct WeakFrame {
    inner: Weak<FrameInner>,
}

impl WeakFrame {
    pub fn upgrade(&self) -> Option<Frame> {
        self.inner.upgrade().map(|inner| Frame { inner })
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stacks = self.stacks();
        f.debug_struct("Frame")
            .field("position", &self.position())
            .field("image_stack", &stacks.image.len())
            .field("audio_stack", &stacks.audio.len())
            .finish()
    }
}

impl Frame {
    /// New frame sized from the profile of `service`.
    pub fn new(service: Option<&Service>) -> Self {
        let profile = service.map_or_else(engine::default_profile, Service::profile);
        let properties = Properties::new();
        properties.set(keys::POSITION, 0);
        properties.set(keys::WIDTH, i64::from(profile.width));
        properties.set(keys::HEIGHT, i64::from(profile.height));
        properties.set(keys::ASPECT_RATIO, profile.sar());
        Self {
            inner: Arc::new(FrameInner {
                properties,
                stacks: Mutex::new(Stacks::default()),
                media: Mutex::new(Media::default()),
                processing: AtomicBool::new(false),
            }),
        }
    }

    fn stacks(&self) -> MutexGuard<'_, Stacks> {
        self.inner.stacks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn media(&self) -> MutexGuard<'_, Media> {
        self.inner.media.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    pub fn downgrade(&self) -> WeakFrame {
        WeakFrame {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn position(&self) -> Position {
        self.properties().get_position(keys::POSITION).max(0)
    }

    pub fn set_position(&self, position: Position) {
        self.properties().set(keys::POSITION, position);
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.properties().get_double(keys::ASPECT_RATIO)
    }

    pub fn set_aspect_ratio(&self, value: f64) {
        self.properties().set(keys::ASPECT_RATIO, value);
    }

    /// Producer that made this frame.
    pub fn original_producer(&self) -> Option<Producer> {
        self.properties()
            .get_service(keys::PRODUCER)
            .and_then(|s| Producer::from_service(&s))
    }

    pub fn is_test_card(&self) -> bool {
        self.stacks().image.is_empty() || self.properties().flag(keys::TEST_IMAGE)
    }

    pub fn is_test_audio(&self) -> bool {
        self.stacks().audio.is_empty() || self.properties().flag(keys::TEST_AUDIO)
    }

    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::Acquire)
    }

    pub fn set_processing(&self, value: bool) {
        self.inner.processing.store(value, Ordering::Release);
    }

    pub fn push_get_image(
        &self,
        op: impl FnOnce(&Frame, &mut ImageRequest) -> EngineResult<Image> + Send + 'static,
    ) {
        self.stacks().image.push_back(ImageEntry::Op(Box::new(op)));
    }

    pub fn pop_get_image(&self) -> Option<ImageEntry> {
        self.stacks().image.pop_back()
    }

    /// Stack `frame` as an image source.
    pub fn push_frame(&self, frame: Frame) {
        self.stacks().image.push_back(ImageEntry::Frame(frame));
    }

    /// Pop the top image entry when it is a frame.
    pub fn pop_frame(&self) -> Option<Frame> {
        let mut stacks = self.stacks();
        match stacks.image.back() {
            Some(ImageEntry::Frame(_)) => match stacks.image.pop_back() {
                Some(ImageEntry::Frame(f)) => Some(f),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn push_front_frame(&self, frame: Frame) {
        self.stacks().image.push_front(ImageEntry::Frame(frame));
    }

    pub fn image_stack_len(&self) -> usize {
        self.stacks().image.len()
    }

    pub fn push_get_audio(
        &self,
        op: impl FnOnce(&Frame, &mut AudioRequest) -> EngineResult<Audio> + Send + 'static,
    ) {
        self.stacks().audio.push_back(AudioEntry::Op(Box::new(op)));
    }

    pub fn pop_get_audio(&self) -> Option<AudioEntry> {
        self.stacks().audio.pop_back()
    }

    pub fn push_audio_frame(&self, frame: Frame) {
        self.stacks().audio.push_back(AudioEntry::Frame(frame));
    }

    pub fn pop_audio_frame(&self) -> Option<Frame> {
        let mut stacks = self.stacks();
        match stacks.audio.back() {
            Some(AudioEntry::Frame(_)) => match stacks.audio.pop_back() {
                Some(AudioEntry::Frame(f)) => Some(f),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn push_front_audio_frame(&self, frame: Frame) {
        self.stacks().audio.push_front(AudioEntry::Frame(frame));
    }

    pub fn audio_stack_len(&self) -> usize {
        self.stacks().audio.len()
    }

    pub fn push_service(&self, service: Service) {
        self.stacks().scratch.push(Scratch::Service(service));
    }

    pub fn pop_service(&self) -> Option<Service> {
        match self.stacks().scratch.pop()? {
            Scratch::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn push_service_int(&self, value: i64) {
        self.stacks().scratch.push(Scratch::Int(value));
    }

    pub fn pop_service_int(&self) -> i64 {
        match self.stacks().scratch.pop() {
            Some(Scratch::Int(v)) => v,
            _ => 0,
        }
    }

    pub fn push_scratch(&self, value: Scratch) {
        self.stacks().scratch.push(value);
    }

    pub fn pop_scratch(&self) -> Option<Scratch> {
        self.stacks().scratch.pop()
    }

    pub(crate) fn push_visited(&self, service: &Service) {
        self.stacks().visited.push(service.downgrade());
    }

    /// Services this frame passed through, innermost first.
    pub fn visited(&self) -> Vec<Service> {
        self.stacks()
            .visited
            .iter()
            .filter_map(WeakService::upgrade)
            .collect()
    }

    pub fn image(&self) -> Option<Image> {
        self.media().image.clone()
    }

    pub fn set_image(&self, image: Image) {
        self.media().image = Some(image);
    }

    /// Drop every pending image op and make `image` the result.
    pub fn replace_image(&self, image: Image) {
        let drained: Vec<ImageEntry> = self.stacks().image.drain(..).collect();
        drop(drained);
        let props = self.properties();
        props.set(keys::WIDTH, i64::from(image.width));
        props.set(keys::HEIGHT, i64::from(image.height));
        props.set(keys::FORMAT, image.format.name());
        self.media().image = Some(image);
    }

    pub fn alpha(&self) -> Option<Arc<Vec<u8>>> {
        self.media().alpha.clone()
    }

    pub fn set_alpha(&self, alpha: Vec<u8>) {
        self.media().alpha = Some(Arc::new(alpha));
    }

    pub fn audio(&self) -> Option<Audio> {
        self.media().audio.clone()
    }

    pub fn set_audio(&self, audio: Audio) {
        self.media().audio = Some(audio);
    }

    pub fn set_convert_image(&self, converter: Option<ImageConverter>) {
        self.media().convert_image = converter;
    }

    pub fn set_convert_audio(&self, converter: Option<AudioConverter>) {
        self.media().convert_audio = converter;
    }

    pub fn convert_image(&self) -> Option<ImageConverter> {
        self.media().convert_image.clone()
    }

    pub fn convert_audio(&self) -> Option<AudioConverter> {
        self.media().convert_audio.clone()
    }

    fn converted_image(&self, image: Image, requested: ImageFormat) -> EngineResult<Image> {
        match self.convert_image() {
            Some(convert) if requested != ImageFormat::None && image.format != requested => {
                convert(self, image, requested)
            }
            _ => Ok(image),
        }
    }

    fn converted_audio(&self, audio: Audio, requested: AudioFormat) -> EngineResult<Audio> {
        match self.convert_audio() {
            Some(convert) if requested != AudioFormat::None && audio.format != requested => {
                convert(self, audio, requested)
            }
            _ => Ok(audio),
        }
    }

    fn record_image(&self, image: &Image) {
        let props = self.properties();
        props.set(keys::WIDTH, i64::from(image.width));
        props.set(keys::HEIGHT, i64::from(image.height));
        props.set(keys::FORMAT, image.format.name());
    }

    // Pull from `source` and adopt its geometry and conversion hooks.
    fn image_from(&self, source: &Frame, request: &mut ImageRequest) -> EngineResult<Image> {
        let (props, sp) = (self.properties(), source.properties());
        sp.pass_list(
            props,
            "rescale.interp, resize_alpha, distort, consumer_deinterlace, deinterlace_method, \
             consumer_tff, consumer_color_trc",
        );
        let image = source.get_image(*request)?;
        props.set(keys::ASPECT_RATIO, source.aspect_ratio());
        props.pass_list(
            sp,
            "progressive, distort, colorspace, force_full_luma, top_field_first, color_trc",
        );
        if let Some(alpha) = source.alpha() {
            self.media().alpha = Some(alpha);
        }
        {
            let mut media = self.media();
            media.convert_image = source.convert_image();
            media.convert_audio = source.convert_audio();
        }
        Ok(image)
    }

    fn audio_from(&self, source: &Frame, request: &mut AudioRequest) -> EngineResult<Audio> {
        source
            .properties()
            .pass_list(self.properties(), "consumer_channel_layout, producer_consumer_fps");
        source.get_audio(*request)
    }

    /// Evaluate the image stack.
    ///
    /// The top entry runs first; when it fails or yields nothing, evaluation falls
    /// through to the next entry, then to the stored image, the `test_card_producer`
    /// and finally a synthesized white card flagged `test_image`.
    pub fn get_image(&self, request: ImageRequest) -> EngineResult<Image> {
        let requested = request.format;
        let props = self.properties();
        let top = self.pop_get_image();
        if let Some(entry) = top {
            props.set(keys::IMAGE_COUNT, props.get_int(keys::IMAGE_COUNT) - 1);
            let mut req = request;
            let produced = match entry {
                ImageEntry::Op(op) => op(self, &mut req),
                ImageEntry::Frame(source) => self.image_from(&source, &mut req),
            };
            return match produced {
                Ok(image) if !image.is_empty() => {
                    let image = self.converted_image(image, requested)?;
                    self.record_image(&image);
                    self.set_image(image.clone());
                    Ok(image)
                }
                Ok(_) => self.get_image(request),
                Err(err) => {
                    tracing::warn!(error = %err, "image op failed, falling back");
                    self.get_image(request)
                }
            };
        }

        if let Some(image) = self.image() {
            let image = self.converted_image(image, requested)?;
            props.set(keys::FORMAT, image.format.name());
            return Ok(image);
        }

        if let Some(card) = props.get_service(keys::TEST_CARD_PRODUCER) {
            let test_frame = card.get_frame(0);
            test_frame
                .properties()
                .pass_list(props, keys::RESCALE_INTERP);
            let image = test_frame.get_image(request)?;
            props.set(keys::TEST_CARD_FRAME, test_frame.clone());
            props.set(keys::ASPECT_RATIO, test_frame.aspect_ratio());
            return Ok(image);
        }

        let width = if request.width == 0 { 720 } else { request.width };
        let height = if request.height == 0 { 576 } else { request.height };
        let image = Image::test_card(request.format, width, height);
        self.record_image(&image);
        props.set(keys::ASPECT_RATIO, 0);
        props.set(keys::TEST_IMAGE, 1);
        self.set_image(image.clone());
        Ok(image)
    }

    /// Evaluate the audio stack; silence flagged `test_audio` when nothing supplies audio.
    pub fn get_audio(&self, request: AudioRequest) -> EngineResult<Audio> {
        let requested = request.format;
        let props = self.properties();
        let hidden = props.flag(keys::TEST_AUDIO);
        let top = self.pop_get_audio();

        let audio = match top {
            Some(entry) if !hidden => {
                let mut req = request;
                let audio = match entry {
                    AudioEntry::Op(op) => op(self, &mut req)?,
                    AudioEntry::Frame(source) => self.audio_from(&source, &mut req)?,
                };
                self.record_audio(&audio);
                let audio = self.converted_audio(audio, requested)?;
                self.set_audio(audio.clone());
                audio
            }
            _ => match self.audio() {
                Some(stored) => self.converted_audio(stored, requested)?,
                None => {
                    let fill = AudioRequest {
                        format: request.format,
                        frequency: if request.frequency == 0 {
                            DEFAULT_AUDIO_FREQUENCY
                        } else {
                            request.frequency
                        },
                        channels: if request.channels == 0 {
                            DEFAULT_AUDIO_CHANNELS
                        } else {
                            request.channels
                        },
                        samples: if request.samples == 0 {
                            DEFAULT_AUDIO_SAMPLES
                        } else {
                            request.samples
                        },
                    };
                    let audio = Audio::silence(fill);
                    self.record_audio(&audio);
                    props.set(keys::TEST_AUDIO, 1);
                    self.set_audio(audio.clone());
                    audio
                }
            },
        };
        Ok(audio)
    }

    fn record_audio(&self, audio: &Audio) {
        let props = self.properties();
        props.set("audio_frequency", i64::from(audio.frequency));
        props.set("audio_channels", i64::from(audio.channels));
        props.set("audio_samples", i64::from(audio.samples));
        props.set("audio_format", audio.format.name());
    }
}

/// Samples per channel that belong to the frame at `position`.
pub fn sample_calculator(fps: f64, frequency: u32, position: Position) -> i64 {
    samples_to_now(fps, frequency, position + 1) - samples_to_now(fps, frequency, position)
}

/// Samples per channel before `position`.
pub fn samples_to_now(fps: f64, frequency: u32, position: Position) -> i64 {
    if fps == 0.0 {
        return 0;
    }
    let round = if position < 0 { -0.5 } else { 0.5 };
    (position as f64 * f64::from(frequency) / fps + round) as i64
}

#[cfg(test)]
#[path = "../../tests/unit/frame/frame.rs"]
mod tests;
