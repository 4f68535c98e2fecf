use std::sync::atomic::Ordering;

use super::*;
use crate::foundation::core::{HIDE_AUDIO, HIDE_VIDEO, ServiceType};
use crate::frame::media::ImageFormat;
use crate::multitrack::multitrack::Multitrack;
use crate::producer::producer::Producer;
use crate::testing::{counting_producer, solid_producer, source_value};

/// Keeps one side of the pair and marks the frame it kept.
struct Keep {
    modality: Modality,
    first: bool,
}

impl TransitionProcess for Keep {
    fn modality(&self) -> Modality {
        self.modality
    }

    fn process(&self, _transition: &Transition, a: Frame, b: Frame) -> Frame {
        let kept = if self.first { a } else { b };
        kept.properties().set("combined", 1);
        kept
    }
}

fn keep_a() -> Transition {
    Transition::with_process(Keep {
        modality: Modality::Video,
        first: true,
    })
}

fn two_tracks(length: i64) -> Multitrack {
    let multitrack = Multitrack::new();
    multitrack.connect(&solid_producer(1, length), 0).unwrap();
    multitrack.connect(&solid_producer(2, length), 1).unwrap();
    multitrack
}

/// Pull every track through `transition` at `position`, the way a tractor does.
fn pull(transition: &Transition, multitrack: &Multitrack, position: Position) -> Vec<Frame> {
    multitrack.producer().seek(position);
    let mut frames = Vec::new();
    for index in 0.. {
        let frame = transition.service().get_frame(index);
        let done = frame.properties().flag(keys::LAST_TRACK);
        frames.push(frame);
        if done {
            break;
        }
    }
    frames
}

fn hide(frame: &Frame) -> i64 {
    frame.properties().get_int(keys::HIDE)
}

#[test]
fn new_transition_defaults() {
    let transition = Transition::new();
    assert_eq!(transition.service().identify(), ServiceType::Transition);
    assert_eq!((transition.a_track(), transition.b_track()), (0, 1));
    assert_eq!((transition.get_in(), transition.get_out()), (0, 0));
    assert!(transition.modality().is_none());
    assert_eq!(keep_a().modality(), Some(Modality::Video));
    assert_eq!(
        keep_a().properties().get_int(keys::TRANSITION_TYPE),
        HIDE_VIDEO
    );
}

#[test]
fn transition_without_a_type_never_activates() {
    let multitrack = two_tracks(20);
    let transition = Transition::new();
    transition.connect(multitrack.service(), 0, 1).unwrap();
    let frames = pull(&transition, &multitrack, 3);
    assert_eq!(frames.len(), 3);
    assert_eq!(source_value(&frames[0]), 1);
    assert_eq!(source_value(&frames[1]), 2);
    assert!(frames.iter().all(|f| hide(f) == 0));
}

#[test]
fn window_gates_activation() {
    let multitrack = two_tracks(20);
    let transition = keep_a();
    transition.connect(multitrack.service(), 0, 1).unwrap();
    transition.set_in_and_out(5, 9);

    let outside = pull(&transition, &multitrack, 0);
    assert_eq!(hide(&outside[1]), 0);
    assert!(!outside[0].properties().flag("combined"));

    let inside = pull(&transition, &multitrack, 7);
    assert!(inside[0].properties().flag("combined"));
    assert_eq!(hide(&inside[0]), 0);
    assert_eq!(hide(&inside[1]), HIDE_VIDEO);

    transition.properties().set(keys::ALWAYS_ACTIVE, 1);
    let forced = pull(&transition, &multitrack, 12);
    assert_eq!(hide(&forced[1]), HIDE_VIDEO);
}

#[test]
fn the_discarded_frame_gets_the_modality_bit() {
    let multitrack = two_tracks(20);
    let transition = Transition::with_process(Keep {
        modality: Modality::Audio,
        first: false,
    });
    transition.connect(multitrack.service(), 0, 1).unwrap();
    let frames = pull(&transition, &multitrack, 2);
    assert_eq!(hide(&frames[0]), HIDE_AUDIO);
    assert_eq!(hide(&frames[1]), 0);
    assert!(frames[1].properties().flag("combined"));
}

#[test]
fn reversed_tracks_swap_the_pair() {
    let multitrack = two_tracks(20);
    let transition = keep_a();
    transition.connect(multitrack.service(), 1, 0).unwrap();
    let frames = pull(&transition, &multitrack, 2);
    assert_eq!(source_value(&frames[0]), 1);
    assert_eq!(hide(&frames[0]), HIDE_VIDEO);
    assert_eq!(hide(&frames[1]), 0);
}

#[test]
fn disabled_transitions_leave_frames_alone() {
    let multitrack = two_tracks(20);
    let transition = keep_a();
    transition.connect(multitrack.service(), 0, 1).unwrap();
    transition.properties().set(keys::DISABLE, 1);
    let frames = pull(&transition, &multitrack, 2);
    assert!(frames.iter().all(|f| hide(f) == 0));
}

#[test]
fn blank_a_track_needs_accepts_blanks() {
    let multitrack = Multitrack::new();
    let blank = Producer::new();
    blank.properties().set(keys::LENGTH, 20);
    blank.properties().set(keys::OUT, 19);
    multitrack.connect(&blank, 0).unwrap();
    multitrack.connect(&solid_producer(2, 20), 1).unwrap();
    let transition = keep_a();
    transition.connect(multitrack.service(), 0, 1).unwrap();

    let frames = pull(&transition, &multitrack, 2);
    assert!(frames.iter().all(|f| hide(f) == 0));

    transition.properties().set(keys::ACCEPTS_BLANKS, 1);
    let frames = pull(&transition, &multitrack, 2);
    assert!(frames[0].properties().flag("combined"));
    assert_eq!(hide(&frames[1]), HIDE_VIDEO);
}

#[test]
fn tracks_are_fetched_once_per_pass() {
    let multitrack = Multitrack::new();
    let (a, a_calls) = counting_producer(20);
    let (b, b_calls) = counting_producer(20);
    multitrack.connect(&a, 0).unwrap();
    multitrack.connect(&b, 1).unwrap();
    let transition = keep_a();
    transition.connect(multitrack.service(), 0, 1).unwrap();

    pull(&transition, &multitrack, 4);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);

    pull(&transition, &multitrack, 5);
    assert_eq!(a_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn set_tracks_drops_held_frames() {
    let multitrack = Multitrack::new();
    let (a, a_calls) = counting_producer(20);
    multitrack.connect(&a, 0).unwrap();
    multitrack.connect(&solid_producer(2, 20), 1).unwrap();
    let transition = keep_a();
    transition.connect(multitrack.service(), 0, 1).unwrap();

    let _ = transition.service().get_frame(0);
    let _ = transition.service().get_frame(0);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);

    transition.set_tracks(0, 1);
    let _ = transition.service().get_frame(0);
    assert_eq!(a_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn progress_spans_the_window() {
    let transition = keep_a();
    transition.set_in_and_out(10, 19);
    assert_eq!(transition.length(), 10);
    let frame = Frame::new(None);
    frame.set_position(15);
    assert_eq!(transition.position(&frame), 5);
    assert!((transition.progress(&frame) - 0.5).abs() < 1e-9);
    assert!((transition.progress_delta(&frame) - 0.05).abs() < 1e-9);
}

#[test]
fn open_window_uses_the_frame_producer() {
    let transition = keep_a();
    let unowned = Frame::new(None);
    assert_eq!(transition.progress(&unowned), 0.0);

    let producer = solid_producer(1, 20);
    producer.seek(5);
    let frame = producer.get_frame(0);
    assert!((transition.progress(&frame) - 0.25).abs() < 1e-9);
}

#[test]
fn b_frame_inherits_scaling_hints_from_a() {
    let multitrack = two_tracks(20);
    let transition = keep_a();
    transition.connect(multitrack.service(), 0, 1).unwrap();
    let frames = pull(&transition, &multitrack, 2);
    let (a, b) = (&frames[0], &frames[1]);
    a.properties().set(keys::RESCALE_INTERP, "bicubic");
    a.properties().set(keys::CONSUMER_DEINTERLACE, 1);

    let request = ImageRequest::new(ImageFormat::Rgb24, 2, 2);
    b.get_image(request).unwrap();
    assert_eq!(
        b.properties().get_str(keys::RESCALE_INTERP).as_deref(),
        Some("bicubic")
    );
    assert!(b.properties().flag(keys::CONSUMER_DEINTERLACE));

    let fresh = pull(&transition, &multitrack, 3);
    fresh[0].get_image(request).unwrap();
    assert_eq!(
        fresh[0].properties().get_str(keys::RESCALE_INTERP).as_deref(),
        Some("nearest")
    );
}
