//! Mixes: overlapping neighbour clips through a two-track tractor.

use crate::effects::transition::Transition;
use crate::foundation::core::{Position, keys};
use crate::foundation::error::{EngineError, EngineResult};
use crate::playlist::playlist::Playlist;
use crate::producer::producer::Producer;
use crate::tractor::tractor::Tractor;

/// Where the mixed frames come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Overlap {
    /// Tail of the first clip over the head of the second.
    Cross,
    /// Frames beyond the out point of the first clip over the head of the second.
    In,
    /// Tail of the first clip over frames before the in point of the second.
    Out,
}

#[derive(Clone)]
struct Side {
    producer: Producer,
    frame_in: Position,
    frame_out: Position,
    frame_count: Position,
}

fn link(clip: &Producer, clip_key: &str, tractor: &Tractor, tractor_key: &str) {
    clip.properties()
        .set(clip_key, tractor.service().downgrade());
    tractor
        .properties()
        .set(tractor_key, clip.service().downgrade());
}

fn mix_tractor(producer: &Producer) -> Option<Tractor> {
    let parent = producer.cut_parent();
    if parent.is_mix() { parent.as_tractor() } else { None }
}

impl Playlist {
    fn side(&self, clip: usize) -> EngineResult<Side> {
        let producer = self
            .get_clip(clip)
            .ok_or_else(|| EngineError::invalid_index(clip as i64, self.count()))?;
        let (frame_in, frame_out, frame_count) = self
            .entry_window(clip)
            .ok_or_else(|| EngineError::invalid_index(clip as i64, self.count()))?;
        Ok(Side {
            producer,
            frame_in,
            frame_out,
            frame_count,
        })
    }

    /// Mix the last `length` frames of `clip` with the first `length` frames of the
    /// next clip, optionally through `transition`.
    pub fn mix(&self, clip: usize, length: Position, transition: Option<&Transition>) -> EngineResult<()> {
        self.build_mix(clip, length, Overlap::Cross, transition)
    }

    /// Mix frames beyond the out point of `clip` with the head of the next clip.
    pub fn mix_in(&self, clip: usize, length: Position) -> EngineResult<()> {
        self.build_mix(clip, length, Overlap::In, None)
    }

    /// Mix the tail of `clip` with frames before the in point of the next clip.
    pub fn mix_out(&self, clip: usize, length: Position) -> EngineResult<()> {
        self.build_mix(clip, length, Overlap::Out, None)
    }

    #[tracing::instrument(level = "debug", skip(self, transition), fields(playlist = %self.id()))]
    fn build_mix(
        &self,
        clip: usize,
        length: Position,
        overlap: Overlap,
        transition: Option<&Transition>,
    ) -> EngineResult<()> {
        if clip + 1 >= self.count() {
            return Err(EngineError::invalid_index(clip as i64, self.count()));
        }
        let a = self.side(clip)?;
        let b = self.side(clip + 1)?;

        let tractor = Tractor::new();
        if let Some(profile) = self.service().explicit_profile() {
            tractor.service().set_profile(profile);
        }

        {
            let _quiet = self.quiet();
            let max_size = match overlap {
                Overlap::Cross => a.frame_count.max(b.frame_count),
                Overlap::In => (a.frame_out + 1).max(b.frame_count),
                Overlap::Out => a.frame_count.max(b.frame_in),
            };
            let length = length.min(max_size);

            let track_a = match overlap {
                Overlap::In if length != a.frame_out + 1 => {
                    a.producer.cut(a.frame_out + 1, a.frame_out + length)
                }
                Overlap::Cross | Overlap::Out if length != a.frame_count => {
                    a.producer.cut(a.frame_out - length + 1, a.frame_out)
                }
                _ => a.producer.clone(),
            };
            let track_b = match overlap {
                Overlap::Out if length != b.frame_in => {
                    b.producer.cut(b.frame_in - length, b.frame_in - 1)
                }
                Overlap::Cross | Overlap::In if length != b.frame_count => {
                    b.producer.cut(b.frame_in, b.frame_in + length - 1)
                }
                _ => b.producer.clone(),
            };

            tractor.set_track(&track_a, 0)?;
            tractor.set_track(&track_b, 1)?;
            self.insert(tractor.producer(), clip + 1, -1, -1)?;
            tractor
                .properties()
                .set(keys::MIX, tractor.service().downgrade());

            if let Some(transition) = transition {
                let field = tractor
                    .field()
                    .ok_or_else(|| EngineError::connection("mix tractor has no field"))?;
                field.plant_transition(transition, 0, 1)?;
                transition.set_in_and_out(0, length - 1);
            }

            let span_b = b.frame_out - b.frame_in;
            if track_b.ptr_eq(&b.producer) {
                self.set_preservation_hack(clip + 2);
                self.remove(clip + 2)?;
            } else if overlap == Overlap::Out && span_b > 0 {
                link(&b.producer, keys::MIX_IN, &tractor, keys::MIX_OUT);
            } else if overlap != Overlap::Out && span_b >= length {
                self.resize_clip(clip + 2, b.frame_in + length, b.frame_out)?;
                link(&b.producer, keys::MIX_IN, &tractor, keys::MIX_OUT);
            } else {
                b.producer.clear();
                self.remove(clip + 2)?;
            }

            let span_a = a.frame_out - a.frame_in;
            if track_a.ptr_eq(&a.producer) {
                self.set_preservation_hack(clip);
                self.remove(clip)?;
            } else if overlap == Overlap::In && span_a > 0 {
                link(&a.producer, keys::MIX_OUT, &tractor, keys::MIX_IN);
            } else if overlap != Overlap::In && span_a >= length {
                self.resize_clip(clip, a.frame_in, a.frame_out - length)?;
                link(&a.producer, keys::MIX_OUT, &tractor, keys::MIX_IN);
            } else {
                a.producer.clear();
                self.remove(clip)?;
            }
        }
        self.refresh();
        Ok(())
    }

    /// Plant another transition on the mix at `clip`, spanning the whole mix.
    pub fn mix_add(&self, clip: usize, transition: &Transition) -> EngineResult<()> {
        let tractor = self
            .get_clip(clip)
            .as_ref()
            .and_then(mix_tractor)
            .ok_or_else(|| EngineError::timeline(format!("clip {clip} is not a mix")))?;
        let field = tractor
            .field()
            .ok_or_else(|| EngineError::connection("mix tractor has no field"))?;
        field.plant_transition(transition, 0, 1)?;
        transition.set_in_and_out(0, self.clip_length(clip) - 1);
        Ok(())
    }

    /// Undo the mix at `clip`, giving its frames back to the neighbours.
    pub fn unmix(&self, clip: usize) -> EngineResult<()> {
        if self.try_unmix(clip) {
            Ok(())
        } else {
            Err(EngineError::timeline(format!("clip {clip} is not a mix")))
        }
    }

    pub(crate) fn try_unmix(&self, clip: usize) -> bool {
        let Some(mix) = self.get_clip(clip) else {
            return false;
        };
        let preserved = self
            .entries()
            .get(clip)
            .is_some_and(|e| e.preservation_hack);
        let Some(tractor) = mix_tractor(&mix) else {
            return false;
        };
        if preserved {
            return false;
        }

        let props = tractor.properties();
        let clip_a = props
            .get_service(keys::MIX_IN)
            .and_then(|s| Producer::from_service(&s));
        let clip_b = props
            .get_service(keys::MIX_OUT)
            .and_then(|s| Producer::from_service(&s));
        let length = tractor.producer().get_playtime();

        {
            let _quiet = self.quiet();
            let mut clip = clip;
            match clip_a {
                Some(a) => a.set_in_and_out(a.get_in(), a.get_out() + length),
                None => {
                    if let Some(cut) = tractor.track(0) {
                        if self.insert(&cut, clip, -1, -1).is_ok() {
                            clip += 1;
                        }
                    }
                }
            }
            match clip_b {
                Some(b) => b.set_in_and_out(b.get_in() - length, b.get_out()),
                None => {
                    if let Some(cut) = tractor.track(1) {
                        if let Err(err) = self.insert(&cut, clip + 1, -1, -1) {
                            tracing::warn!(playlist = %self.id(), error = %err, "mix track lost");
                        }
                    }
                }
            }
            props.remove(keys::MIX);
            if let Err(err) = self.remove(clip) {
                tracing::warn!(playlist = %self.id(), error = %err, "unmix left the mix entry");
            }
        }
        self.refresh();
        true
    }

    /// Resize the mix at `clip`, moving the neighbour clips and mix tracks by the
    /// length difference. Returns false when `clip` is not a mix.
    pub(crate) fn resize_mix(&self, clip: usize, in_point: Position, out_point: Position) -> bool {
        let Some(mix) = self.get_clip(clip) else {
            return false;
        };
        let Some(tractor) = mix_tractor(&mix) else {
            return false;
        };

        let props = tractor.properties();
        let clip_a = props
            .get_service(keys::MIX_IN)
            .and_then(|s| Producer::from_service(&s));
        let clip_b = props
            .get_service(keys::MIX_OUT)
            .and_then(|s| Producer::from_service(&s));
        let length = out_point - in_point + 1;
        let diff = length - tractor.producer().get_playtime();

        {
            let _quiet = self.quiet();
            if let Some(a) = &clip_a {
                a.set_in_and_out(a.get_in(), a.get_out() - diff);
            }
            if let Some(b) = &clip_b {
                b.set_in_and_out(b.get_in() + diff, b.get_out());
            }
            if let Some(track_a) = tractor.track(0) {
                track_a.set_in_and_out(track_a.get_in() - diff, track_a.get_out());
            }
            if let Some(track_b) = tractor.track(1) {
                track_b.set_in_and_out(track_b.get_in(), track_b.get_out() + diff);
            }
            if let Some(multitrack) = tractor.multitrack() {
                multitrack.producer().set_in_and_out(in_point, out_point);
            }
            tractor.producer().set_in_and_out(in_point, out_point);
            mix.properties().set(keys::LENGTH, length);
            mix.set_in_and_out(in_point, out_point);
        }
        self.refresh();
        true
    }
}

#[cfg(test)]
#[path = "../../tests/unit/playlist/mix.rs"]
mod tests;
