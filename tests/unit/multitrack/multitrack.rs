use super::*;
use crate::foundation::core::{HIDE_VIDEO, ServiceType};
use crate::playlist::playlist::Playlist;
use crate::testing::{solid_producer, source_value};

#[test]
fn new_multitrack_is_empty() {
    let multitrack = Multitrack::new();
    assert_eq!(multitrack.count(), 0);
    assert_eq!(multitrack.producer().get_length(), 0);
    assert_eq!(multitrack.producer().get_out(), -1);
    assert_eq!(multitrack.service().identify(), ServiceType::Multitrack);
    assert_eq!(multitrack.clip(Whence::Start, 0), 0);
}

#[test]
fn length_follows_the_longest_track() {
    let multitrack = Multitrack::new();
    let a = solid_producer(1, 10);
    let b = solid_producer(2, 25);
    multitrack.connect(&a, 0).unwrap();
    assert_eq!(a.eof(), Some(EofPolicy::Pause));
    multitrack.connect(&b, 1).unwrap();

    assert_eq!(multitrack.count(), 2);
    assert_eq!(multitrack.producer().get_length(), 25);
    assert_eq!(multitrack.producer().get_out(), 24);
    assert_eq!(a.eof(), Some(EofPolicy::Continue));
    assert_eq!(b.eof(), Some(EofPolicy::Continue));
}

#[test]
fn connecting_past_the_end_leaves_holes() {
    let multitrack = Multitrack::new();
    multitrack.connect(&solid_producer(1, 10), 2).unwrap();
    assert_eq!(multitrack.count(), 3);
    assert!(multitrack.track(0).is_none());
    assert!(multitrack.track(2).is_some());
    assert_eq!(multitrack.producer().get_length(), 10);
}

#[test]
fn a_producer_occupies_one_track() {
    let multitrack = Multitrack::new();
    let a = solid_producer(1, 10);
    assert_eq!(multitrack.connect(&a, 0).unwrap(), ConnectStatus::Connected);
    assert_eq!(multitrack.connect(&a, 1).unwrap(), ConnectStatus::AlreadyConnected);
    assert_eq!(multitrack.count(), 1);
}

#[test]
fn replacing_a_track_drops_the_old_listener() {
    let multitrack = Multitrack::new();
    let a = solid_producer(1, 10);
    let b = solid_producer(2, 30);
    multitrack.connect(&a, 0).unwrap();
    let before = a.service().events().listener_count();
    multitrack.connect(&b, 0).unwrap();
    assert_eq!(a.service().events().listener_count(), before - 1);
    assert!(multitrack.track(0).unwrap().ptr_eq(&b));
    assert_eq!(multitrack.producer().get_length(), 30);
}

#[test]
fn track_edits_refresh_the_length() {
    let multitrack = Multitrack::new();
    let a = solid_producer(1, 20);
    multitrack.connect(&a, 0).unwrap();
    a.set_in_and_out(0, 4);
    assert_eq!(multitrack.producer().get_length(), 5);
    assert_eq!(multitrack.producer().get_out(), 4);
}

#[test]
fn insert_shifts_later_tracks() {
    let multitrack = Multitrack::new();
    let a = solid_producer(1, 10);
    let b = solid_producer(2, 10);
    let c = solid_producer(3, 10);
    multitrack.connect(&a, 0).unwrap();
    multitrack.connect(&b, 1).unwrap();
    multitrack.insert(&c, 0).unwrap();
    assert_eq!(multitrack.count(), 3);
    assert!(multitrack.track(0).unwrap().ptr_eq(&c));
    assert!(multitrack.track(1).unwrap().ptr_eq(&a));
    assert!(multitrack.track(2).unwrap().ptr_eq(&b));
    assert!(multitrack.service().input(0).unwrap().ptr_eq(c.service()));
}

#[test]
fn disconnect_compacts_and_refreshes() {
    let multitrack = Multitrack::new();
    multitrack.connect(&solid_producer(1, 40), 0).unwrap();
    let b = solid_producer(2, 25);
    multitrack.connect(&b, 1).unwrap();
    multitrack.disconnect(0).unwrap();
    assert_eq!(multitrack.count(), 1);
    assert!(multitrack.track(0).unwrap().ptr_eq(&b));
    assert_eq!(multitrack.producer().get_length(), 25);
    assert!(multitrack.disconnect(5).is_err());
}

#[test]
fn frames_come_from_the_requested_track() {
    let multitrack = Multitrack::new();
    multitrack.connect(&solid_producer(1, 10), 0).unwrap();
    multitrack.connect(&solid_producer(2, 25), 1).unwrap();
    multitrack.producer().seek(3);

    let first = multitrack.service().get_frame(0);
    assert_eq!(source_value(&first), 1);
    assert_eq!(first.position(), 3);
    let second = multitrack.service().get_frame(1);
    assert_eq!(source_value(&second), 2);
    assert_eq!(multitrack.producer().position(), 3);

    let end = multitrack.service().get_frame(2);
    assert!(end.properties().flag(keys::LAST_TRACK));
    assert_eq!(end.position(), 3);
    assert_eq!(multitrack.producer().position(), 4);
}

#[test]
fn short_tracks_yield_test_frames_past_their_end() {
    let multitrack = Multitrack::new();
    multitrack.connect(&solid_producer(1, 10), 0).unwrap();
    multitrack.connect(&solid_producer(2, 25), 1).unwrap();
    multitrack.producer().seek(15);

    let short = multitrack.service().get_frame(0);
    assert!(short.is_test_card());
    assert_eq!(short.position(), 15);
    let long = multitrack.service().get_frame(1);
    assert!(!long.is_test_card());
}

#[test]
fn track_frames_carry_the_parent_hide_bits() {
    let multitrack = Multitrack::new();
    let a = solid_producer(1, 10);
    a.properties().set(keys::HIDE, HIDE_VIDEO);
    multitrack.connect(&a, 0).unwrap();
    let frame = multitrack.service().get_frame(0);
    assert_eq!(frame.properties().get_int(keys::HIDE), HIDE_VIDEO);
}

#[test]
fn clip_walks_the_union_of_boundaries() {
    let multitrack = Multitrack::new();
    let playlist = Playlist::new();
    playlist.append(&solid_producer(1, 10)).unwrap();
    playlist.append(&solid_producer(2, 5)).unwrap();
    multitrack.connect(playlist.producer(), 0).unwrap();
    multitrack.connect(&solid_producer(3, 8), 1).unwrap();

    assert_eq!(multitrack.clip(Whence::Start, 0), 0);
    assert_eq!(multitrack.clip(Whence::Start, 1), 8);
    assert_eq!(multitrack.clip(Whence::Start, 2), 10);
    assert_eq!(multitrack.clip(Whence::Start, 9), 15);
    assert_eq!(multitrack.clip(Whence::End, 0), 15);
    assert_eq!(multitrack.clip(Whence::End, 1), 10);

    multitrack.producer().seek(9);
    assert_eq!(multitrack.clip(Whence::Current, 0), 8);
    assert_eq!(multitrack.clip(Whence::Current, 1), 10);
    assert_eq!(multitrack.clip(Whence::Current, -5), 0);
}
