#![forbid(unsafe_code)]

pub mod effects;
pub mod engine;
pub mod foundation;
pub mod frame;
pub mod multitrack;
pub mod playlist;
pub mod producer;
pub mod properties;
pub mod service;
pub mod tractor;


pub use effects::filter::{Filter, FilterProcess};
pub use effects::transition::{Transition, TransitionProcess};
pub use engine::EngineConfig;
pub use foundation::core::{
    ConnectStatus, EofPolicy, HIDE_AUDIO, HIDE_VIDEO, Modality, Position, ServiceId, ServiceType,
    Whence, keys,
};
pub use foundation::error::{EngineError, EngineResult};
pub use foundation::profile::Profile;
pub use frame::frame::{Frame, WeakFrame};
pub use frame::media::{Audio, AudioFormat, AudioRequest, Image, ImageFormat, ImageRequest};
pub use multitrack::multitrack::Multitrack;
pub use playlist::playlist::{ClipInfo, Playlist};
pub use producer::producer::{Producer, ProducerHook};
pub use properties::bag::{Properties, Value};
pub use properties::events::{Event, EventKind, Subscription};
pub use service::cache::CacheItem;
pub use service::service::{Service, WeakService};
pub use tractor::field::Field;
pub use tractor::tractor::Tractor;
