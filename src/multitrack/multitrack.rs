use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::foundation::core::{ConnectStatus, EofPolicy, Position, ServiceId, Whence, keys};
use crate::foundation::error::{EngineError, EngineResult};
use crate::frame::frame::Frame;
use crate::producer::producer::{Producer, ProducerClass};
use crate::properties::bag::Properties;
use crate::properties::events::{EventKind, Subscription};
use crate::service::service::Service;

struct Track {
    producer: Producer,
    _listener: Subscription,
}

pub(crate) struct MultitrackState {
    tracks: Mutex<Vec<Option<Track>>>,
}

/// Parallel tracks addressed by index; the length is that of the longest track.
#[derive(Clone)]
pub struct Multitrack {
    producer: Producer,
    state: Arc<MultitrackState>,
}

impl fmt::Debug for Multitrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multitrack")
            .field("id", &self.id())
            .field("count", &self.count())
            .field("length", &self.producer.get_length())
            .finish()
    }
}

impl Default for Multitrack {
    fn default() -> Self {
        Self::new()
    }
}

fn track_slot(track: usize) -> EngineResult<i32> {
    i32::try_from(track).map_err(|_| EngineError::invalid_index(track as i64, 0))
}

impl Multitrack {
    pub fn new() -> Self {
        let state = Arc::new(MultitrackState {
            tracks: Mutex::new(Vec::new()),
        });
        let producer = Producer::with_class(ProducerClass::Multitrack(Arc::clone(&state)));
        let props = producer.properties();
        props.set(keys::RESOURCE, "<multitrack>");
        props.set(keys::IN, 0);
        props.set(keys::OUT, -1);
        props.set(keys::LENGTH, 0);
        Self { producer, state }
    }

    pub(crate) fn from_parts(producer: Producer, state: Arc<MultitrackState>) -> Self {
        Self { producer, state }
    }

    pub fn from_producer(producer: &Producer) -> Option<Self> {
        match producer.class() {
            Some(ProducerClass::Multitrack(state)) => {
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

    fn tracks(&self) -> MutexGuard<'_, Vec<Option<Track>>> {
        self.state.tracks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn producers(&self) -> Vec<Producer> {
        self.tracks()
            .iter()
            .flatten()
            .map(|t| t.producer.clone())
            .collect()
    }

    /// Number of track slots, including empty ones.
    pub fn count(&self) -> usize {
        self.tracks().len()
    }

    pub fn track(&self, index: usize) -> Option<Producer> {
        self.tracks()
            .get(index)
            .and_then(|t| t.as_ref().map(|t| t.producer.clone()))
    }

    fn subscribe(&self, producer: &Producer) -> Subscription {
        let weak = self.service().downgrade();
        let id = producer.service().events().listen(
            Some(self.id()),
            EventKind::ProducerChanged,
            move |_| {
                let multitrack = weak
                    .upgrade()
                    .and_then(|s| Producer::from_service(&s))
                    .and_then(|p| Multitrack::from_producer(&p));
                if let Some(multitrack) = multitrack {
                    multitrack.refresh();
                }
            },
        );
        Subscription::new(producer.service().downgrade(), id)
    }

    /// Put `producer` on `track`, replacing whatever occupied it.
    pub fn connect(&self, producer: &Producer, track: usize) -> EngineResult<ConnectStatus> {
        let status = self
            .service()
            .connect_producer(producer.service(), track_slot(track)?)?;
        if !status.is_connected() {
            return Ok(status);
        }
        let listener = self.subscribe(producer);
        let previous = {
            let mut tracks = self.tracks();
            if track >= tracks.len() {
                let len = tracks.len();
                tracks.try_reserve(track + 1 - len)?;
                tracks.resize_with(track + 1, || None);
            }
            tracks[track].replace(Track {
                producer: producer.clone(),
                _listener: listener,
            })
        };
        drop(previous);
        tracing::debug!(multitrack = %self.id(), producer = %producer.id(), track, "track connected");
        self.refresh();
        Ok(status)
    }

    /// Put `producer` on `track`, shifting later tracks up by one.
    pub fn insert(&self, producer: &Producer, track: usize) -> EngineResult<ConnectStatus> {
        if track >= self.count() {
            return self.connect(producer, track);
        }
        let status = self
            .service()
            .insert_producer(producer.service(), track_slot(track)?)?;
        if !status.is_connected() {
            return Ok(status);
        }
        let listener = self.subscribe(producer);
        {
            let mut tracks = self.tracks();
            tracks.try_reserve(1)?;
            tracks.insert(
                track,
                Some(Track {
                    producer: producer.clone(),
                    _listener: listener,
                }),
            );
        }
        self.refresh();
        Ok(status)
    }

    /// Remove `track`; later tracks move down by one.
    pub fn disconnect(&self, track: usize) -> EngineResult<()> {
        let count = self.count();
        if track >= count {
            return Err(EngineError::invalid_index(track as i64, count));
        }
        self.service().disconnect_producer(track)?;
        let removed = self.tracks().remove(track);
        drop(removed);
        self.refresh();
        Ok(())
    }

    /// Republish `length`/`out` from the longest track.
    pub fn refresh(&self) {
        let producers = self.producers();
        let continue_tracks = self.count() > 1;
        let mut length = 0;
        for producer in &producers {
            if continue_tracks {
                producer
                    .properties()
                    .set(keys::EOF, EofPolicy::Continue.as_str());
            }
            length = length.max(producer.get_playtime());
        }
        {
            let _quiet = self.service().events().blocked();
            self.service().set_property(keys::LENGTH, length);
        }
        self.service().set_property(keys::OUT, length - 1);
    }

    /// Edit point addressed relative to `whence`, over the union of all track boundaries.
    pub fn clip(&self, whence: Whence, index: i64) -> Position {
        let mut boundaries = BTreeSet::new();
        for producer in self.producers() {
            match producer.as_playlist() {
                Some(playlist) => {
                    for j in 0..playlist.count() {
                        boundaries.insert(playlist.clip(Whence::Start, j as i64));
                    }
                }
                None => {
                    boundaries.insert(0);
                }
            }
            boundaries.insert(producer.get_out() + 1);
        }
        let map: Vec<Position> = boundaries.into_iter().collect();
        let (Some(&first), Some(&last)) = (map.first(), map.last()) else {
            return 0;
        };
        let count = map.len() as i64;
        let at = |i: i64| usize::try_from(i).ok().and_then(|i| map.get(i).copied());

        match whence {
            Whence::Start => at(index).unwrap_or(last),
            Whence::Current => {
                let position = self.producer.position();
                let span = (count - 2).max(0);
                let current = (0..span)
                    .find(|&i| {
                        let i = i as usize;
                        position >= map[i] && position < map[i + 1]
                    })
                    .unwrap_or(span);
                let index = index + current;
                if index < 0 { first } else { at(index).unwrap_or(last) }
            }
            Whence::End => {
                if index < count {
                    at(count - index - 1).unwrap_or(first)
                } else {
                    first
                }
            }
        }
    }

    pub(crate) fn produce(&self, index: i32) -> EngineResult<Frame> {
        let track = usize::try_from(index).ok().and_then(|i| self.track(i));
        match track {
            Some(track) => {
                let hide = track.cut_parent().properties().get_int(keys::HIDE);
                let position = self.producer.frame();
                let speed = self.producer.speed();
                track.seek(position);
                let frame = track.get_frame(0);
                let fp = frame.properties();
                fp.set(keys::SPEED, speed);
                frame.set_position(position);
                fp.set(keys::HIDE, hide);
                Ok(frame)
            }
            None => {
                let frame = Frame::new(Some(self.service()));
                frame.set_position(self.producer.position());
                if usize::try_from(index).map_or(true, |i| i >= self.count()) {
                    frame.properties().set(keys::LAST_TRACK, 1);
                    self.producer.prepare_next();
                }
                Ok(frame)
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/multitrack/multitrack.rs"]
mod tests;
