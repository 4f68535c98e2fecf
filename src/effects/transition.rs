use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::foundation::core::{ConnectStatus, Modality, Position, ServiceId, keys};
use crate::foundation::error::EngineResult;
use crate::frame::frame::Frame;
use crate::frame::media::ImageRequest;
use crate::properties::bag::Properties;
use crate::service::service::{Service, ServiceKind};

/// Two-frame combine implemented by transition plugins.
///
/// `process` returns the frame that carries the result; the other frame gets the
/// modality's `hide` bit so the tractor skips it.
pub trait TransitionProcess: Send + Sync {
    fn modality(&self) -> Modality;

    fn process(&self, transition: &Transition, a: Frame, b: Frame) -> Frame;
}

#[derive(Default)]
struct Held {
    /// Frames for tracks `base..`, fetched once per harvest.
    frames: Vec<Frame>,
    base: i32,
    held: bool,
}

pub(crate) struct TransitionCore {
    process: Option<Box<dyn TransitionProcess>>,
    held: Mutex<Held>,
}

/// A service that combines the frames of two tracks.
#[derive(Clone)]
pub struct Transition {
    service: Service,
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.service.id())
            .field("a_track", &self.a_track())
            .field("b_track", &self.b_track())
            .field("in", &self.get_in())
            .field("out", &self.get_out())
            .finish()
    }
}

impl Default for Transition {
    fn default() -> Self {
        Self::new()
    }
}

fn has_default_interp(value: Option<&str>) -> bool {
    value.is_none_or(|v| v == "none")
}

impl Transition {
    /// A transition without a hook. It has no modality, so it never activates.
    pub fn new() -> Self {
        Self::with_core(TransitionCore {
            process: None,
            held: Mutex::new(Held::default()),
        })
    }

    pub fn with_process(process: impl TransitionProcess + 'static) -> Self {
        let modality = process.modality();
        let transition = Self::with_core(TransitionCore {
            process: Some(Box::new(process)),
            held: Mutex::new(Held::default()),
        });
        transition
            .properties()
            .set(keys::TRANSITION_TYPE, modality.bit());
        transition
    }

    fn with_core(core: TransitionCore) -> Self {
        let service = Service::with_kind(ServiceKind::Transition(core));
        let props = service.properties();
        props.set(keys::MLT_TYPE, "transition");
        props.set(keys::UNIQUE_ID, service.id().0 as i64);
        props.set(keys::IN, 0);
        props.set(keys::OUT, 0);
        props.set(keys::A_TRACK, 0);
        props.set(keys::B_TRACK, 1);
        Self { service }
    }

    pub(crate) fn wrap(service: Service) -> Self {
        Self { service }
    }

    pub fn from_service(service: &Service) -> Option<Self> {
        matches!(service.kind(), ServiceKind::Transition(_))
            .then(|| Self::wrap(service.clone()))
    }

    fn core(&self) -> Option<&TransitionCore> {
        match self.service.kind() {
            ServiceKind::Transition(core) => Some(core),
            _ => None,
        }
    }

    fn held(&self) -> Option<MutexGuard<'_, Held>> {
        self.core()
            .map(|core| core.held.lock().unwrap_or_else(|e| e.into_inner()))
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

    pub fn ptr_eq(&self, other: &Transition) -> bool {
        self.service.ptr_eq(&other.service)
    }

    /// Modality recorded in `_transition_type`.
    pub fn modality(&self) -> Option<Modality> {
        Modality::from_bits(self.properties().get_int(keys::TRANSITION_TYPE))
    }

    pub fn is_disabled(&self) -> bool {
        self.properties().flag(keys::DISABLE)
    }

    pub fn a_track(&self) -> i32 {
        i32::try_from(self.properties().get_int(keys::A_TRACK)).unwrap_or(0)
    }

    pub fn b_track(&self) -> i32 {
        i32::try_from(self.properties().get_int(keys::B_TRACK)).unwrap_or(0)
    }

    pub fn get_in(&self) -> Position {
        self.properties().get_position(keys::IN)
    }

    pub fn get_out(&self) -> Position {
        self.properties().get_position(keys::OUT)
    }

    pub fn set_in_and_out(&self, in_point: Position, out_point: Position) {
        self.properties().set(keys::IN, in_point);
        self.properties().set(keys::OUT, out_point);
    }

    /// Retarget the transition. Frames held for the current harvest are dropped.
    pub fn set_tracks(&self, a_track: i32, b_track: i32) {
        self.properties().set(keys::A_TRACK, a_track);
        self.properties().set(keys::B_TRACK, b_track);
        let dropped = self.held().map(|mut held| std::mem::take(&mut *held));
        drop(dropped);
    }

    /// Wire `producer` into input `a_track` and combine tracks `a_track` and `b_track`.
    pub fn connect(&self, producer: &Service, a_track: i32, b_track: i32) -> EngineResult<ConnectStatus> {
        let status = self.service.connect_producer(producer, a_track)?;
        if status.is_connected() {
            self.properties().set(keys::A_TRACK, a_track);
            self.properties().set(keys::B_TRACK, b_track);
        }
        Ok(status)
    }

    /// Length of the window; 0 when open-ended.
    pub fn length(&self) -> Position {
        let (in_point, out_point) = (self.get_in(), self.get_out());
        if out_point > 0 { out_point - in_point + 1 } else { 0 }
    }

    pub fn position(&self, frame: &Frame) -> Position {
        frame.position() - self.get_in()
    }

    fn window_for(&self, frame: &Frame) -> (Position, Position) {
        let (in_point, out_point) = (self.get_in(), self.get_out());
        if out_point != 0 {
            return (in_point, out_point);
        }
        match frame.original_producer() {
            Some(producer) => (producer.get_in(), producer.get_out()),
            None => (in_point, out_point),
        }
    }

    /// Fraction of the window covered at `frame`.
    pub fn progress(&self, frame: &Frame) -> f64 {
        let (in_point, out_point) = self.window_for(frame);
        if out_point == 0 {
            return 0.0;
        }
        (frame.position() - in_point) as f64 / (out_point - in_point + 1) as f64
    }

    /// Half the progress advanced by one frame, for field-based rendering.
    pub fn progress_delta(&self, frame: &Frame) -> f64 {
        let (in_point, out_point) = self.window_for(frame);
        if out_point == 0 {
            return 0.0;
        }
        let length = (out_point - in_point + 1) as f64;
        let position = frame.position();
        let x = (position - in_point) as f64 / length;
        let y = (position + 1 - in_point) as f64 / length;
        (y - x) / 2.0
    }

    pub fn process(&self, a: Frame, b: Frame) -> Frame {
        match self.core().and_then(|core| core.process.as_deref()) {
            Some(hook) => hook.process(self, a, b),
            None => a,
        }
    }

    fn push_preprocessing(&self, a: &Frame, b: &Frame) {
        let sar = self.service.profile().sar();
        a.push_get_image(move |frame: &Frame, request: &mut ImageRequest| {
            let props = frame.properties();
            if has_default_interp(props.get_str(keys::RESCALE_INTERP).as_deref()) {
                props.set(keys::RESCALE_INTERP, "nearest");
            }
            if frame.aspect_ratio() == 0.0 {
                frame.set_aspect_ratio(sar);
            }
            frame.get_image(*request)
        });

        let a_frame = a.downgrade();
        b.push_get_image(move |frame: &Frame, request: &mut ImageRequest| {
            let props = frame.properties();
            let a_frame = a_frame.upgrade();
            if !props.contains(keys::RESCALE_INTERP) {
                let rescale = a_frame
                    .as_ref()
                    .and_then(|a| a.properties().get_str(keys::RESCALE_INTERP))
                    .filter(|r| !has_default_interp(Some(r.as_str())))
                    .unwrap_or_else(|| "nearest".to_string());
                props.set(keys::RESCALE_INTERP, rescale);
            }
            if frame.aspect_ratio() == 0.0 {
                frame.set_aspect_ratio(sar);
            }
            if let Some(a_frame) = &a_frame {
                props.pass_list(
                    a_frame.properties(),
                    "consumer_deinterlace, deinterlace_method, consumer_tff, \
                     consumer_color_trc, consumer_channel_layout",
                );
            }
            frame.get_image(*request)
        });
    }

    // Pick the a/b pair among the fetched frames and run the hook when active.
    fn combine(&self, frames: &[Frame], reverse: bool) {
        let Some(modality) = self.modality() else {
            tracing::error!(transition = %self.id(), "invalid transition type");
            return;
        };
        let invalid = |frame: &Frame| match modality {
            Modality::Video => frame.is_test_card(),
            Modality::Audio => frame.is_test_audio(),
        };
        let Some(b_frame) = frames.len().checked_sub(1) else {
            return;
        };
        let mut a_frame = 0;
        let active = if self.properties().flag(keys::ACCEPTS_BLANKS) {
            true
        } else {
            while a_frame <= b_frame && invalid(&frames[a_frame]) {
                a_frame += 1;
            }
            a_frame != b_frame && !invalid(&frames[b_frame])
        };
        let active = if active && !self.properties().flag(keys::ALWAYS_ACTIVE) && a_frame <= b_frame {
            let position = frames[a_frame].position();
            let (in_point, out_point) = (self.get_in(), self.get_out());
            position >= in_point && (out_point == 0 || position <= out_point)
        } else {
            active
        };
        if !active || self.is_disabled() {
            return;
        }

        let first = if !reverse && a_frame <= b_frame { a_frame } else { b_frame };
        let second = if !reverse || a_frame > b_frame { b_frame } else { a_frame };
        let (a, b) = (frames[first].clone(), frames[second].clone());
        let bit = modality.bit();
        let mut a_hide = a.properties().get_int(keys::HIDE);
        let mut b_hide = b.properties().get_int(keys::HIDE);
        if a_hide & bit != 0 || b_hide & bit != 0 {
            return;
        }

        self.push_preprocessing(&a, &b);
        let result = self.process(a.clone(), b.clone());
        if result.ptr_eq(&a) {
            b_hide |= bit;
        } else {
            a_hide |= bit;
        }
        a.properties().set(keys::HIDE, a_hide);
        b.properties().set(keys::HIDE, b_hide);
        tracing::trace!(transition = %self.id(), position = a.position(), "transition applied");
    }

    pub(crate) fn produce(&self, index: i32) -> EngineResult<Frame> {
        let Some(producer) = self.service.producer() else {
            return Ok(Frame::new(Some(&self.service)));
        };
        let (mut a_track, mut b_track) = (self.a_track(), self.b_track());
        let reverse = a_track > b_track;
        if reverse {
            std::mem::swap(&mut a_track, &mut b_track);
        }
        let (a_track, b_track) = (a_track.max(0), b_track.max(0));

        let held = self.held().is_some_and(|h| h.held);
        if !held {
            let frames: Vec<Frame> = (a_track..=b_track).map(|i| producer.get_frame(i)).collect();
            self.combine(&frames, reverse);
            if let Some(mut held) = self.held() {
                held.frames = frames;
                held.base = a_track;
                held.held = true;
            }
        }

        let cached = if (a_track..=b_track).contains(&index) {
            self.held().and_then(|h| {
                usize::try_from(index - h.base)
                    .ok()
                    .and_then(|i| h.frames.get(i).cloned())
            })
        } else {
            None
        };
        let frame = match cached {
            Some(frame) => frame,
            None => producer.get_frame(index),
        };
        if let Some(mut held) = self.held() {
            held.held = !frame.properties().flag(keys::LAST_TRACK);
            if !held.held {
                held.frames.clear();
            }
        }
        Ok(frame)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/transition.rs"]
mod tests;
