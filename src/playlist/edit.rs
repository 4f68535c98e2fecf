//! Timeline edits. Every edit leaves `length == sum(frame_count)` and `out == length - 1`.

use crate::foundation::core::{Position, Whence, keys};
use crate::foundation::error::{EngineError, EngineResult};
use crate::playlist::playlist::Playlist;
use crate::producer::producer::Producer;

impl Playlist {
    fn check_clip(&self, clip: usize) -> EngineResult<()> {
        let count = self.count();
        if clip < count {
            Ok(())
        } else {
            Err(EngineError::invalid_index(clip as i64, count))
        }
    }

    fn clip_producer(&self, clip: usize) -> EngineResult<Producer> {
        self.check_clip(clip)?;
        self.get_clip(clip)
            .ok_or_else(|| EngineError::timeline(format!("clip {clip} was released")))
    }

    /// Append the whole play window of `producer`.
    pub fn append(&self, producer: &Producer) -> EngineResult<()> {
        self.virtual_append(Some(producer), 0, producer.get_playtime() - 1)
    }

    /// Append `producer` over `[in, out]`; both negative means the whole window.
    pub fn append_io(&self, producer: &Producer, in_point: Position, out_point: Position) -> EngineResult<()> {
        if in_point < 0 && out_point < 0 {
            self.append(producer)
        } else {
            self.virtual_append(Some(producer), in_point, out_point)
        }
    }

    /// Append `out + 1` frames of blank.
    pub fn blank(&self, out_point: Position) -> EngineResult<()> {
        if out_point < 0 {
            return Err(EngineError::timeline(format!("blank out point {out_point}")));
        }
        let blank = self.blank_producer().clone();
        self.virtual_append(Some(&blank), 0, out_point)
    }

    pub fn insert(
        &self,
        producer: &Producer,
        clip: usize,
        in_point: Position,
        out_point: Position,
    ) -> EngineResult<()> {
        {
            let _quiet = self.quiet();
            self.append_io(producer, in_point, out_point)?;
            self.move_clip(self.count() - 1, clip);
        }
        self.refresh();
        Ok(())
    }

    /// Remove entry `clip` (clamped to the last entry). Mix entries are unmixed instead.
    #[tracing::instrument(level = "debug", skip(self), fields(playlist = %self.id()))]
    pub fn remove(&self, clip: usize) -> EngineResult<()> {
        let count = self.count();
        if count == 0 {
            return Err(EngineError::invalid_index(clip as i64, 0));
        }
        let clip = clip.min(count - 1);
        if self.try_unmix(clip) {
            return Ok(());
        }

        let current = self.current_clip();
        let position = self.producer().position();
        let start = self.clip(Whence::Start, clip as i64);
        let entry = self.entries().remove(clip);

        if !entry.preservation_hack {
            if let Some(producer) = &entry.producer {
                let props = producer.properties();
                if let Some(mix) = props.get_service(keys::MIX_IN) {
                    mix.properties().remove(keys::MIX_OUT);
                }
                if let Some(mix) = props.get_service(keys::MIX_OUT) {
                    mix.properties().remove(keys::MIX_IN);
                }
                if producer.service().strong_count() == 1 {
                    producer.clear();
                }
            }
        }
        let frame_count = entry.frame_count;
        drop(entry);

        let remaining = self.count();
        if clip == current {
            self.producer().seek(start);
        } else if clip < current && remaining > 0 {
            self.producer().seek(position - frame_count);
        } else if remaining == 0 {
            self.producer().seek(0);
        }
        self.refresh();
        Ok(())
    }

    /// Move entry `src` to `dest`; both are clamped. The play position follows the
    /// clip it was in.
    pub fn move_clip(&self, src: usize, dest: usize) {
        let count = self.count();
        if count < 2 {
            return;
        }
        let (src, dest) = (src.min(count - 1), dest.min(count - 1));
        if src == dest {
            return;
        }

        let mut current = self.current_clip();
        let offset = self.producer().position() - self.clip(Whence::Start, current as i64);
        if current == src {
            current = dest;
        } else if src < current && current < dest {
            current -= 1;
        } else if dest < current && current < src {
            current += 1;
        } else if current == dest {
            current = src;
        }

        {
            let mut entries = self.entries();
            let entry = entries.remove(src);
            entries.insert(dest, entry);
        }
        self.producer()
            .seek(self.clip(Whence::Start, current as i64) + offset);
        self.refresh();
    }

    /// Rearrange entries so that new entry `i` is old entry `indices[i]`.
    pub fn reorder(&self, indices: &[usize]) -> EngineResult<()> {
        let count = self.count();
        if count < 2 {
            return Err(EngineError::timeline("reorder needs at least two clips"));
        }
        if indices.len() != count {
            return Err(EngineError::timeline(format!(
                "reorder expects {count} indexes, got {}",
                indices.len()
            )));
        }
        let mut seen = vec![false; count];
        for &index in indices {
            if index >= count {
                return Err(EngineError::invalid_index(index as i64, count));
            }
            if std::mem::replace(&mut seen[index], true) {
                return Err(EngineError::timeline(format!("index {index} repeated")));
            }
        }
        {
            let mut entries = self.entries();
            let mut old: Vec<_> = entries.drain(..).map(Some).collect();
            for &index in indices {
                if let Some(entry) = old[index].take() {
                    entries.push(entry);
                }
            }
        }
        self.refresh();
        Ok(())
    }

    pub fn repeat_clip(&self, clip: usize, repeat: i64) -> EngineResult<()> {
        self.check_clip(clip)?;
        if repeat < 1 {
            return Err(EngineError::timeline(format!("repeat {repeat}")));
        }
        if let Some(entry) = self.entries().get_mut(clip) {
            entry.repeat = repeat;
        }
        self.refresh();
        Ok(())
    }

    /// Set the window of entry `clip`. Blank entries grow as needed; mix entries move
    /// their neighbours with them.
    pub fn resize_clip(&self, clip: usize, in_point: Position, out_point: Position) -> EngineResult<()> {
        self.check_clip(clip)?;
        if self.resize_mix(clip, in_point, out_point) {
            return Ok(());
        }
        let producer = self.clip_producer(clip)?;
        {
            let _quiet = self.quiet();
            if producer.is_blank() {
                let length = out_point - in_point + 1;
                let blank = self.blank_producer();
                if length > blank.get_length() {
                    blank.properties().set(keys::LENGTH, length);
                    blank.set_in_and_out(0, out_point - in_point);
                }
                if length > producer.get_length() {
                    producer.properties().set(keys::LENGTH, length);
                }
            }
            let length = producer.get_length();
            let in_point = in_point.max(0);
            let out_point = if out_point < 0 || out_point >= length {
                length - 1
            } else {
                out_point
            };
            let (in_point, out_point) = if out_point < in_point {
                (out_point, in_point)
            } else {
                (in_point, out_point)
            };
            producer.set_in_and_out(in_point, out_point);
        }
        self.refresh();
        Ok(())
    }

    /// Split entry `clip` after `offset` frames; a negative offset counts back from
    /// the end. The tail inherits the `meta.*` attributes.
    #[tracing::instrument(level = "debug", skip(self), fields(playlist = %self.id()))]
    pub fn split(&self, clip: usize, offset: Position) -> EngineResult<()> {
        let producer = self.clip_producer(clip)?;
        let (frame_in, frame_out, frame_count) = self
            .entry_window(clip)
            .ok_or_else(|| EngineError::invalid_index(clip as i64, self.count()))?;
        let offset = if offset < 0 { frame_count + offset - 1 } else { offset };
        if offset < 0 || offset >= frame_count - 1 {
            return Err(EngineError::timeline(format!(
                "split offset {offset} outside clip {clip} of {frame_count} frames"
            )));
        }
        {
            let _quiet = self.quiet();
            self.resize_clip(clip, frame_in, frame_in + offset)?;
            if !producer.is_blank() {
                let tail = producer.cut(frame_in + offset + 1, frame_out);
                for (name, value) in producer.properties().with_prefix(keys::META_PREFIX) {
                    tail.properties().set(&name, value);
                }
                self.insert(&tail, clip + 1, 0, -1)?;
            } else {
                let blank = self.blank_producer().clone();
                self.insert(&blank, clip + 1, 0, frame_out - offset - 1)?;
            }
        }
        self.refresh();
        Ok(())
    }

    /// Split the clip under `position`. With `left` the cut lands before `position`,
    /// otherwise after it. Returns the position, clamped to the playlist.
    pub fn split_at(&self, position: Position, left: bool) -> Position {
        let playtime = self.producer().get_playtime();
        if position >= 0 && position < playtime {
            let clip = self.get_clip_index_at(position);
            let start = self.clip(Whence::Start, clip as i64);
            let result = if left && position != start {
                self.split(clip, position - start - 1)
            } else if !left {
                self.split(clip, position - start)
            } else {
                Ok(())
            };
            if let Err(err) = result {
                tracing::debug!(playlist = %self.id(), position, error = %err, "split skipped");
            }
            position
        } else if position <= 0 {
            0
        } else {
            playtime
        }
    }

    /// Replace entries `clip..=clip + count` with one entry holding them as a nested
    /// playlist.
    #[tracing::instrument(level = "debug", skip(self), fields(playlist = %self.id()))]
    pub fn join(&self, clip: usize, count: usize) -> EngineResult<()> {
        self.check_clip(clip)?;
        let nested = Playlist::new();
        if let Some(profile) = self.service().explicit_profile() {
            nested.service().set_profile(profile);
        }
        let count = count.min(self.count() - clip - 1);
        {
            let _quiet = self.quiet();
            for _ in 0..=count {
                let producer = self.get_clip(clip);
                let repeat = self.entries().get(clip).map_or(1, |e| e.repeat);
                if let Some(producer) = producer {
                    nested.append(&producer)?;
                    nested.repeat_clip(nested.count() - 1, repeat)?;
                }
                self.set_preservation_hack(clip);
                self.remove(clip)?;
            }
        }
        self.insert(nested.producer(), clip, 0, -1)
    }

    /// Merge runs of adjacent blanks. Unless `keep_length`, a trailing blank is removed.
    pub fn consolidate_blanks(&self, keep_length: bool) -> EngineResult<()> {
        {
            let _quiet = self.quiet();
            let mut clip = 1;
            while clip < self.count() {
                if self.is_blank(clip - 1) && self.is_blank(clip) {
                    let merged = self.clip_length(clip - 1) + self.clip_length(clip);
                    self.resize_clip(clip - 1, 0, merged - 1)?;
                    self.remove(clip)?;
                } else {
                    clip += 1;
                }
            }
            let count = self.count();
            if !keep_length && count > 0 && self.is_blank(count - 1) {
                self.remove(count - 1)?;
            }
        }
        self.refresh();
        Ok(())
    }

    /// Swap entry `clip` for a blank of the same duration and hand back its producer.
    pub fn replace_with_blank(&self, clip: usize) -> EngineResult<Option<Producer>> {
        if self.is_blank(clip) {
            return Ok(None);
        }
        let producer = self.clip_producer(clip)?;
        let (frame_in, frame_out, _) = self
            .entry_window(clip)
            .ok_or_else(|| EngineError::invalid_index(clip as i64, self.count()))?;
        {
            let _quiet = self.quiet();
            self.remove(clip)?;
            self.blank(frame_out - frame_in)?;
            self.move_clip(self.count() - 1, clip);
        }
        self.refresh();
        producer.set_in_and_out(frame_in, frame_out);
        Ok(Some(producer))
    }

    /// Insert `out + 1` frames of blank at `clip`.
    pub fn insert_blank(&self, clip: usize, out_point: Position) -> EngineResult<()> {
        if out_point < 0 {
            return Err(EngineError::timeline(format!("blank out point {out_point}")));
        }
        {
            let _quiet = self.quiet();
            self.blank(out_point)?;
            self.move_clip(self.count() - 1, clip);
        }
        self.refresh();
        Ok(())
    }

    /// Grow or shrink the blank at `position` by `length` frames. With `find`, the
    /// blank after a non-blank clip is used, or inserted when `length` is positive.
    pub fn pad_blanks(&self, position: Position, length: Position, find: bool) -> EngineResult<()> {
        if length == 0 {
            return Ok(());
        }
        {
            let _quiet = self.quiet();
            let mut clip = self.get_clip_index_at(position);
            let count = self.count();
            if find && clip < count && !self.is_blank(clip) {
                clip += 1;
            }
            if clip < count && self.is_blank(clip) {
                let info = self.get_clip_info(clip)?;
                if info.frame_out + length > info.frame_in {
                    self.resize_clip(clip, info.frame_in, info.frame_out + length)?;
                } else {
                    self.remove(clip)?;
                }
            } else if find && clip < count && length > 0 {
                self.insert_blank(clip, length)?;
            }
        }
        self.refresh();
        Ok(())
    }

    /// Place `producer` at timeline `position` and return its clip index. Inside a
    /// blank the blank is split around it; with `overwrite`, a following blank is
    /// consumed and positions past the end are padded with blank.
    #[tracing::instrument(level = "debug", skip(self, producer), fields(playlist = %self.id()))]
    pub fn insert_at(&self, position: Position, producer: &Producer, overwrite: bool) -> EngineResult<usize> {
        if position < 0 {
            return Err(EngineError::timeline(format!("insert position {position}")));
        }
        let length = producer.get_playtime();
        let mut clip = self.get_clip_index_at(position);
        let start = self.clip(Whence::Start, clip as i64);
        let count = self.count();

        let result = {
            let _quiet = self.quiet();
            if clip < count && self.is_blank(clip) {
                if position != start && self.split(clip, position - start - 1).is_ok() {
                    clip += 1;
                }
                if length < self.clip_length(clip) {
                    let _ = self.split(clip, length - 1);
                }
                self.remove(clip)?;
                self.insert(producer, clip, -1, -1)?;
                clip
            } else if clip < count {
                if position > start + self.clip_length(clip) / 2 {
                    clip += 1;
                }
                if overwrite && clip < count && self.is_blank(clip) {
                    if length < self.clip_length(clip) {
                        let _ = self.split(clip, length);
                    }
                    self.remove(clip)?;
                }
                self.insert(producer, clip, -1, -1)?;
                clip
            } else {
                if overwrite && position != start {
                    self.blank(position - start - 1)?;
                }
                self.append(producer)?;
                self.count() - 1
            }
        };
        self.refresh();
        Ok(result)
    }

    /// Cut `length` frames out of the timeline starting at `position`, then tidy the
    /// blanks. Returns the clip index now at `position`.
    #[tracing::instrument(level = "debug", skip(self), fields(playlist = %self.id()))]
    pub fn remove_region(&self, position: Position, length: Position) -> EngineResult<usize> {
        let mut clip = self.get_clip_index_at(position);
        if clip >= self.count() {
            return Ok(clip);
        }
        {
            let _quiet = self.quiet();
            let clip_start = self.clip_start(clip);
            let list_length = self.producer().get_playtime();
            let mut length = length.min(list_length - position);
            if clip_start < position {
                self.split(clip, position - clip_start - 1)?;
                clip += 1;
            }
            while length > 0 && clip < self.count() {
                if self.clip_length(clip) > length {
                    self.split(clip, length - 1)?;
                }
                length -= self.clip_length(clip);
                self.remove(clip)?;
            }
            self.consolidate_blanks(false)?;
        }
        self.refresh();
        Ok(self.get_clip_index_at(position))
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let entries = std::mem::take(&mut *self.entries());
        drop(entries);
        self.refresh();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/playlist/edit.rs"]
mod tests;
