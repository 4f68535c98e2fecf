use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::foundation::core::{EofPolicy, Position, ServiceId, Whence, keys};
use crate::foundation::error::{EngineError, EngineResult};
use crate::frame::frame::Frame;
use crate::producer::producer::{Producer, ProducerClass};
use crate::properties::bag::Properties;
use crate::properties::events::{BlockGuard, Event, EventKind, Subscription};
use crate::service::service::Service;

/// One slot of the virtual timeline.
pub(crate) struct Entry {
    /// `None` once autoclose released it.
    pub(crate) producer: Option<Producer>,
    pub(crate) frame_in: Position,
    pub(crate) frame_out: Position,
    pub(crate) frame_count: Position,
    pub(crate) repeat: i64,
    pub(crate) producer_length: Position,
    /// Set when another container took over the producer; removal then leaves it as is.
    pub(crate) preservation_hack: bool,
    _listener: Subscription,
}

pub(crate) struct PlaylistState {
    blank: Producer,
    entries: Mutex<Vec<Entry>>,
}

/// Snapshot of one playlist entry.
#[derive(Clone, Debug)]
pub struct ClipInfo {
    pub clip: usize,
    /// Cut parent of the entry producer.
    pub producer: Producer,
    /// The entry producer itself.
    pub cut: Producer,
    pub start: Position,
    pub resource: Option<String>,
    pub frame_in: Position,
    pub frame_out: Position,
    pub frame_count: Position,
    pub repeat: i64,
    /// Length of the cut parent.
    pub length: Position,
    pub fps: f64,
}

/// Sequential container presenting its entries as one virtual timeline.
#[derive(Clone)]
pub struct Playlist {
    producer: Producer,
    state: Arc<PlaylistState>,
}

impl fmt::Debug for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Playlist")
            .field("id", &self.id())
            .field("count", &self.count())
            .field("length", &self.producer.get_length())
            .finish()
    }
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a timeline lookup landed.
pub(crate) struct Located {
    pub(crate) index: usize,
    /// Position relative to the entry start, or past the end when nothing matched.
    pub(crate) position: Position,
    /// Sum of entry counts up to and including `index`.
    pub(crate) total: Position,
    pub(crate) producer: Option<Producer>,
}

impl Playlist {
    pub fn new() -> Self {
        let blank = Producer::new();
        blank.properties().set(keys::MLT_SERVICE, "blank");
        blank.properties().set(keys::RESOURCE, "blank");

        let state = Arc::new(PlaylistState {
            blank,
            entries: Mutex::new(Vec::new()),
        });
        let producer = Producer::with_class(ProducerClass::Playlist(Arc::clone(&state)));
        let props = producer.properties();
        props.set(keys::EOF, EofPolicy::Pause.as_str());
        props.set(keys::RESOURCE, "<playlist>");
        props.set(keys::IN, 0);
        props.set(keys::OUT, -1);
        props.set(keys::LENGTH, 0);
        Self { producer, state }
    }

    pub(crate) fn from_parts(producer: Producer, state: Arc<PlaylistState>) -> Self {
        Self { producer, state }
    }

    /// View `producer` as a playlist when it is one.
    pub fn from_producer(producer: &Producer) -> Option<Self> {
        match producer.class() {
            Some(ProducerClass::Playlist(state)) => {
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

    /// The shared filler producer every blank entry cuts.
    pub fn blank_producer(&self) -> &Producer {
        &self.state.blank
    }

    pub(crate) fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.state.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn quiet(&self) -> BlockGuard<'_> {
        self.service().events().blocked()
    }

    pub fn count(&self) -> usize {
        self.entries().len()
    }

    /// Producer of entry `clip`.
    pub fn get_clip(&self, clip: usize) -> Option<Producer> {
        self.entries().get(clip).and_then(|e| e.producer.clone())
    }

    pub(crate) fn entry_window(&self, clip: usize) -> Option<(Position, Position, Position)> {
        self.entries()
            .get(clip)
            .map(|e| (e.frame_in, e.frame_out, e.frame_count))
    }

    pub(crate) fn set_preservation_hack(&self, clip: usize) {
        if let Some(entry) = self.entries().get_mut(clip) {
            entry.preservation_hack = true;
        }
    }

    pub(crate) fn locate(&self, position: Position) -> Located {
        let entries = self.entries();
        let mut position = position;
        let mut total = 0;
        for (index, entry) in entries.iter().enumerate() {
            total += entry.frame_count;
            if position < entry.frame_count {
                return Located {
                    index,
                    position,
                    total,
                    producer: entry.producer.clone(),
                };
            }
            position -= entry.frame_count;
        }
        Located {
            index: entries.len(),
            position,
            total,
            producer: None,
        }
    }

    pub fn get_clip_at(&self, position: Position) -> Option<Producer> {
        self.locate(position).producer
    }

    pub fn get_clip_index_at(&self, position: Position) -> usize {
        self.locate(position).index
    }

    /// Index of the entry under the play position, or `count()` past the end.
    pub fn current_clip(&self) -> usize {
        self.get_clip_index_at(self.producer.frame())
    }

    /// Producer under the play position, or the blank.
    pub fn current(&self) -> Producer {
        self.get_clip(self.current_clip())
            .unwrap_or_else(|| self.state.blank.clone())
    }

    /// Start position of a clip addressed relative to `whence`. The result is
    /// clamped to `[0, count]`, so `clip(End, 0)` is the playlist length.
    pub fn clip(&self, whence: Whence, index: i64) -> Position {
        let current = match whence {
            Whence::Current => self.current_clip() as i64,
            _ => 0,
        };
        let entries = self.entries();
        let count = entries.len() as i64;
        let absolute = match whence {
            Whence::Start => index,
            Whence::Current => current + index,
            Whence::End => count - index,
        }
        .clamp(0, count) as usize;
        entries[..absolute].iter().map(|e| e.frame_count).sum()
    }

    pub fn get_clip_info(&self, clip: usize) -> EngineResult<ClipInfo> {
        let start = self.clip(Whence::Start, clip as i64);
        let entries = self.entries();
        let entry = entries
            .get(clip)
            .ok_or_else(|| EngineError::invalid_index(clip as i64, entries.len()))?;
        let cut = entry
            .producer
            .clone()
            .ok_or_else(|| EngineError::timeline(format!("clip {clip} was released")))?;
        let (frame_in, frame_out, frame_count, repeat) =
            (entry.frame_in, entry.frame_out, entry.frame_count, entry.repeat);
        drop(entries);

        let producer = cut.cut_parent();
        Ok(ClipInfo {
            clip,
            resource: producer.properties().get_str(keys::RESOURCE),
            length: producer.get_length(),
            fps: producer.fps(),
            producer,
            cut,
            start,
            frame_in,
            frame_out,
            frame_count,
            repeat,
        })
    }

    /// Start of `clip`, or the playlist playtime when `clip` is past the end.
    pub fn clip_start(&self, clip: usize) -> Position {
        match self.get_clip_info(clip) {
            Ok(info) => info.start,
            Err(_) => self.producer.get_playtime(),
        }
    }

    pub fn clip_length(&self, clip: usize) -> Position {
        self.entries().get(clip).map_or(0, |e| e.frame_count)
    }

    pub fn clip_is_mix(&self, clip: usize) -> bool {
        self.get_clip(clip)
            .is_some_and(|p| p.cut_parent().is_mix())
    }

    /// True for blank entries and for indexes without a producer.
    pub fn is_blank(&self, clip: usize) -> bool {
        self.get_clip(clip).is_none_or(|p| p.is_blank())
    }

    pub fn is_blank_at(&self, position: Position) -> bool {
        self.get_clip_at(position).is_none_or(|p| p.is_blank())
    }

    /// Blank frames from `clip` onwards, stopping after `bounded` non-blank clips
    /// (0 means no bound).
    pub fn blanks_from(&self, clip: usize, bounded: usize) -> Position {
        let count = self.count();
        if clip >= count {
            return 0;
        }
        let mut blanks = 0;
        if self.is_blank(clip) {
            blanks += self.clip_length(clip);
        }
        let mut bounded = if bounded == 0 { count as i64 } else { bounded as i64 };
        let mut clip = clip + 1;
        while clip < count && bounded >= 0 {
            if self.is_blank(clip) {
                blanks += self.clip_length(clip);
            } else {
                bounded -= 1;
            }
            clip += 1;
        }
        blanks
    }

    fn subscribe(&self, parent: &Producer) -> Subscription {
        let weak = self.service().downgrade();
        let id = parent.service().events().listen(
            Some(self.id()),
            EventKind::ProducerChanged,
            move |_| {
                let playlist = weak
                    .upgrade()
                    .and_then(|s| Producer::from_service(&s))
                    .and_then(|p| Playlist::from_producer(&p));
                if let Some(playlist) = playlist {
                    playlist.refresh();
                }
            },
        );
        Subscription::new(parent.service().downgrade(), id)
    }

    /// Recompute entry windows from their producers and republish `length`/`out`.
    pub fn refresh(&self) {
        let total: Position = {
            let mut entries = self.entries();
            for entry in entries.iter_mut() {
                if let Some(producer) = &entry.producer {
                    let (p_in, p_out) = (producer.get_in(), producer.get_out());
                    if entry.frame_in != p_in || entry.frame_out != p_out {
                        let playtime = producer.get_playtime();
                        if playtime < 1 {
                            entry.frame_in = 0;
                            entry.frame_out = -1;
                        } else {
                            entry.frame_in = p_in;
                            entry.frame_out = p_out;
                        }
                        entry.producer_length = playtime;
                    }
                }
                entry.frame_count = (entry.frame_out - entry.frame_in + 1) * entry.repeat;
            }
            entries.iter().map(|e| e.frame_count).sum()
        };
        {
            let _quiet = self.quiet();
            self.service().set_property(keys::LENGTH, total);
        }
        self.service().set_property(keys::OUT, total - 1);
    }

    /// Append `source` over `[in, out]`. Blank sources become cuts of the shared blank,
    /// non-cuts are cut, cuts are used as they are.
    pub(crate) fn virtual_append(
        &self,
        source: Option<&Producer>,
        in_point: Position,
        out_point: Position,
    ) -> EngineResult<()> {
        let blank = &self.state.blank;
        let (producer, in_point, out_point) = match source {
            Some(source) if !source.is_blank() => {
                if source.is_cut() {
                    let in_point = if in_point < 0 { source.get_in() } else { in_point };
                    let out_point = if out_point < 0 || out_point > source.get_out() {
                        source.get_out()
                    } else {
                        out_point
                    };
                    (source.clone(), in_point, out_point)
                } else {
                    let cut = source.cut(in_point, out_point);
                    let in_point = in_point.max(cut.get_in());
                    let out_point = if out_point < 0 || out_point > cut.get_out() {
                        cut.get_out()
                    } else {
                        out_point
                    };
                    (cut, in_point, out_point)
                }
            }
            _ => {
                let length = out_point - in_point + 1;
                if length > blank.get_length() {
                    let _quiet = blank.service().events().blocked();
                    blank.set_in_and_out(in_point, out_point);
                }
                let producer = match source {
                    Some(s) if s.is_cut() && s.cut_parent().ptr_eq(blank) => s.clone(),
                    _ => blank.cut(in_point, out_point),
                };
                if length > producer.get_length() {
                    producer.properties().set(keys::LENGTH, length);
                }
                (producer, in_point, out_point)
            }
        };

        let parent = producer.cut_parent();
        if parent.properties().flag(keys::META_FX_CUT) {
            while let Some(filter) = parent.filter(0) {
                if !filter.properties().flag(keys::LOADER) {
                    break;
                }
                parent.detach(&filter)?;
            }
            producer.properties().set(keys::META_FX_CUT, 1);
        }

        let listener = self.subscribe(&parent);
        producer
            .properties()
            .set(keys::EOF, EofPolicy::Pause.as_str());
        producer.set_speed(0.0);
        let producer_length = producer.get_playtime();
        {
            let mut entries = self.entries();
            entries.try_reserve(1)?;
            entries.push(Entry {
                producer: Some(producer),
                frame_in: in_point,
                frame_out: out_point,
                frame_count: out_point - in_point + 1,
                repeat: 1,
                producer_length,
                preservation_hack: false,
                _listener: listener,
            });
        }
        self.refresh();
        Ok(())
    }

    // Previous entries are released only from two clips back, so callers can still
    // inspect the clip that just finished.
    fn autoclose(&self, index: usize) {
        for j in 0..index.saturating_sub(1) {
            let Some(producer) = self.get_clip(j) else {
                continue;
            };
            let guard = producer.service().lock();
            if let Some(entry) = self.entries().get_mut(j) {
                entry.producer = None;
            }
            drop(guard);
            tracing::debug!(playlist = %self.id(), clip = j, "autoclosed entry");
        }
    }

    /// Map the play position onto an entry and seek it. Returns the producer to pull
    /// from and whether the landing entry is a single frame.
    pub(crate) fn virtual_seek(&self) -> (Producer, bool) {
        let original = self.producer.frame();
        let located = self.locate(original);
        let props = self.properties();

        if located.index > 1 && located.position < 2 && props.flag(keys::AUTOCLOSE) {
            self.autoclose(located.index);
        }

        let eof = self.producer.eof();
        let count = self.count();
        let mut progressive = false;
        let producer = match located.producer {
            Some(producer) => {
                let (_, _, frame_count) = self.entry_window(located.index).unwrap_or((0, -1, 1));
                let repeat = self.entries().get(located.index).map_or(1, |e| e.repeat);
                let span = (frame_count / repeat.max(1)).max(1);
                progressive = span == 1;
                producer.seek(located.position % span);
                producer
            }
            None if eof == Some(EofPolicy::Pause) && located.total > 0 && count > 0 => {
                let last = {
                    let entries = self.entries();
                    entries.last().map(|e| {
                        (e.producer.clone(), e.frame_out, e.frame_count / e.repeat.max(1))
                    })
                };
                match last {
                    Some((Some(producer), frame_out, span)) => {
                        let span = span.max(1);
                        self.producer.seek(original - 1);
                        producer.seek(frame_out % span);
                        self.producer.set_speed(0.0);
                        producer.set_speed(0.0);
                        progressive = span == 1;
                        producer
                    }
                    _ => self.state.blank.clone(),
                }
            }
            None if eof == Some(EofPolicy::Loop) && located.total > 0 && count > 0 => {
                match self.get_clip(0) {
                    Some(first) => {
                        self.producer.seek(0);
                        first.seek(0);
                        first
                    }
                    None => self.state.blank.clone(),
                }
            }
            None => self.state.blank.clone(),
        };

        if original == located.total - 2 {
            self.service().fire(&Event::PlaylistNext(located.index));
        }
        (producer, progressive)
    }

    /// Truncate the entry under the play position at the current position.
    pub(crate) fn virtual_set_out(&self) {
        let located = self.locate(self.producer.frame());
        let changed = {
            let mut entries = self.entries();
            match entries.get_mut(located.index) {
                Some(entry) if entry.frame_out != located.position => {
                    entry.frame_out = located.position;
                    entry.frame_count = entry.frame_out - entry.frame_in + 1;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.refresh();
        }
    }

    pub(crate) fn produce(&self, index: i32) -> EngineResult<Frame> {
        let (real, progressive) = self.virtual_seek();

        let frame = if real.properties().flag(keys::META_FX_CUT) {
            let parent = real.cut_parent();
            let frame = Frame::new(Some(parent.service()));
            frame.properties().set(keys::FX_CUT, 1);
            parent.service().apply_filters(&frame, 0);
            real.service().apply_filters(&frame, 0);
            frame
        } else {
            real.get_frame(index)
        };

        let fp = frame.properties();
        if fp.flag(keys::END_OF_CLIP) {
            self.virtual_set_out();
        }
        if progressive {
            fp.set(keys::CONSUMER_DEINTERLACE, 1);
            fp.set(keys::TEST_AUDIO, 1);
        }
        frame.set_position(self.producer.frame());
        self.producer.prepare_next();
        Ok(frame)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/playlist/playlist.rs"]
mod tests;
