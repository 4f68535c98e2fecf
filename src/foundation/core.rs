use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Frame position on a producer timeline.
pub type Position = i64;

/// Stable opaque identity of a service, used for cache keys and listener ownership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceId(pub u64);

impl ServiceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of wiring a producer into a service input slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectStatus {
    Connected,
    /// The producer already occupies one of the inputs; nothing changed.
    AlreadyConnected,
}

impl ConnectStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Coarse classification of a service, derived from its `mlt_type` and `resource`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceType {
    Unknown,
    Producer,
    Playlist,
    Tractor,
    Multitrack,
    Filter,
    Transition,
    Consumer,
}

/// What a producer does when asked for a frame past its out point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EofPolicy {
    #[default]
    Pause,
    Continue,
    Loop,
}

impl EofPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Continue => "continue",
            Self::Loop => "loop",
        }
    }

    /// Parse the `eof` property value. Absent or unknown values behave like no policy.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value? {
            "pause" => Some(Self::Pause),
            "continue" => Some(Self::Continue),
            "loop" => Some(Self::Loop),
            _ => None,
        }
    }
}

/// Origin for relative clip addressing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// Media modality touched by a transition; the value is also its `hide` bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Modality {
    Video,
    Audio,
}

impl Modality {
    pub fn bit(self) -> i64 {
        match self {
            Self::Video => HIDE_VIDEO,
            Self::Audio => HIDE_AUDIO,
        }
    }

    pub fn from_bits(value: i64) -> Option<Self> {
        match value {
            HIDE_VIDEO => Some(Self::Video),
            HIDE_AUDIO => Some(Self::Audio),
            _ => None,
        }
    }
}

pub const HIDE_VIDEO: i64 = 1;
pub const HIDE_AUDIO: i64 = 2;

/// Property keys shared by the core and its plugins.
pub mod keys {
    pub const IN: &str = "in";
    pub const OUT: &str = "out";
    pub const LENGTH: &str = "length";
    pub const RESOURCE: &str = "resource";
    pub const MLT_TYPE: &str = "mlt_type";
    pub const MLT_SERVICE: &str = "mlt_service";
    pub const EOF: &str = "eof";
    pub const SPEED: &str = "_speed";
    pub const POSITION: &str = "_position";
    pub const FRAME: &str = "_frame";
    pub const HIDE: &str = "hide";
    pub const LAST_TRACK: &str = "last_track";
    pub const TEST_IMAGE: &str = "test_image";
    pub const TEST_AUDIO: &str = "test_audio";
    pub const DISABLE: &str = "disable";
    pub const FILTER_PRIVATE: &str = "_filter_private";
    pub const META_PREFIX: &str = "meta.";
    pub const SET_PREFIX: &str = "set.";
    pub const CUT: &str = "_cut";
    pub const CUT_PARENT: &str = "_cut_parent";
    pub const MIX: &str = "mlt_mix";
    pub const MIX_IN: &str = "mix_in";
    pub const MIX_OUT: &str = "mix_out";
    pub const TRACK: &str = "track";
    pub const A_TRACK: &str = "a_track";
    pub const B_TRACK: &str = "b_track";
    pub const ALWAYS_ACTIVE: &str = "always_active";
    pub const ACCEPTS_BLANKS: &str = "accepts_blanks";
    pub const TRANSITION_TYPE: &str = "_transition_type";
    pub const AUTOCLOSE: &str = "autoclose";
    pub const FX_CUT: &str = "fx_cut";
    pub const META_FX_CUT: &str = "meta.fx_cut";
    /// Marks loader-inserted normalising filters.
    pub const LOADER: &str = "_loader";
    pub const END_OF_CLIP: &str = "end_of_clip";
    pub const NEED_PREVIOUS_NEXT: &str = "_need_previous_next";
    pub const UNIQUE_ID: &str = "_unique_id";
    pub const IGNORE_POINTS: &str = "ignore_points";
    pub const PRODUCER: &str = "_producer";
    pub const ASPECT_RATIO: &str = "aspect_ratio";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const FORMAT: &str = "format";
    pub const PROGRESSIVE: &str = "progressive";
    pub const IMAGE_COUNT: &str = "image_count";
    pub const TEST_CARD_PRODUCER: &str = "test_card_producer";
    pub const TEST_CARD_FRAME: &str = "test_card_frame";
    pub const PREVIOUS_FRAME: &str = "previous frame";
    pub const NEXT_FRAME: &str = "next frame";
    pub const CONSUMER_DEINTERLACE: &str = "consumer_deinterlace";
    pub const RESCALE_INTERP: &str = "rescale.interp";
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
