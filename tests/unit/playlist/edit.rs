use super::*;
use crate::testing::solid_producer;

fn lengths(playlist: &Playlist) -> Vec<Position> {
    (0..playlist.count()).map(|i| playlist.clip_length(i)).collect()
}

fn three_clips() -> (Playlist, Producer, Producer, Producer) {
    let playlist = Playlist::new();
    let a = solid_producer(1, 10);
    let b = solid_producer(2, 20);
    let c = solid_producer(3, 5);
    playlist.append(&a).unwrap();
    playlist.append(&b).unwrap();
    playlist.append(&c).unwrap();
    (playlist, a, b, c)
}

#[test]
fn blank_rejects_negative_out() {
    let playlist = Playlist::new();
    assert!(playlist.blank(-1).is_err());
    assert_eq!(playlist.count(), 0);
}

#[test]
fn remove_keeps_the_play_position_on_its_clip() {
    let (playlist, ..) = three_clips();
    playlist.producer().seek(32);
    playlist.remove(1).unwrap();
    assert_eq!(playlist.producer().get_length(), 15);
    assert_eq!(playlist.producer().get_out(), 14);
    assert_eq!(playlist.producer().position(), 12);
    assert_eq!(lengths(&playlist), vec![10, 5]);
}

#[test]
fn remove_on_empty_playlist_fails() {
    let playlist = Playlist::new();
    assert!(playlist.remove(0).is_err());
}

#[test]
fn move_clip_carries_the_position() {
    let (playlist, a, ..) = three_clips();
    playlist.producer().seek(5);
    playlist.move_clip(0, 2);
    assert_eq!(playlist.producer().position(), 30);
    assert!(playlist.get_clip(2).unwrap().cut_parent().ptr_eq(&a));
    assert_eq!(lengths(&playlist), vec![20, 5, 10]);
}

#[test]
fn insert_places_the_clip_at_the_index() {
    let (playlist, ..) = three_clips();
    let d = solid_producer(4, 8);
    playlist.insert(&d, 1, 2, 5).unwrap();
    assert_eq!(lengths(&playlist), vec![10, 4, 20, 5]);
    assert!(playlist.get_clip(1).unwrap().cut_parent().ptr_eq(&d));
    assert_eq!(playlist.producer().get_length(), 39);
}

#[test]
fn reorder_rearranges_entries() {
    let (playlist, a, b, c) = three_clips();
    playlist.reorder(&[2, 0, 1]).unwrap();
    assert!(playlist.get_clip(0).unwrap().cut_parent().ptr_eq(&c));
    assert!(playlist.get_clip(1).unwrap().cut_parent().ptr_eq(&a));
    assert!(playlist.get_clip(2).unwrap().cut_parent().ptr_eq(&b));
    assert_eq!(playlist.producer().get_length(), 35);
}

#[test]
fn reorder_rejects_bad_permutations() {
    let (playlist, ..) = three_clips();
    assert!(playlist.reorder(&[0, 1]).is_err());
    assert!(playlist.reorder(&[0, 0, 1]).is_err());
    assert!(playlist.reorder(&[0, 1, 7]).is_err());
    assert_eq!(lengths(&playlist), vec![10, 20, 5]);
}

#[test]
fn resize_clip_clamps_to_the_producer() {
    let (playlist, ..) = three_clips();
    playlist.resize_clip(1, 5, 100).unwrap();
    assert_eq!(playlist.clip_length(1), 15);
    playlist.resize_clip(1, 9, 3).unwrap();
    let cut = playlist.get_clip(1).unwrap();
    assert_eq!((cut.get_in(), cut.get_out()), (3, 9));
    assert_eq!(playlist.producer().get_length(), 22);
}

#[test]
fn resize_blank_grows_past_its_length() {
    let playlist = Playlist::new();
    playlist.blank(4).unwrap();
    playlist.resize_clip(0, 0, 49).unwrap();
    assert_eq!(playlist.clip_length(0), 50);
    assert!(playlist.is_blank(0));
}

#[test]
fn split_copies_meta_to_the_tail() {
    let playlist = Playlist::new();
    playlist.append(&solid_producer(1, 20)).unwrap();
    playlist
        .get_clip(0)
        .unwrap()
        .properties()
        .set("meta.title", "intro");

    playlist.split(0, 7).unwrap();
    assert_eq!(lengths(&playlist), vec![8, 12]);
    let tail = playlist.get_clip(1).unwrap();
    assert_eq!((tail.get_in(), tail.get_out()), (8, 19));
    assert_eq!(tail.properties().get_str("meta.title").as_deref(), Some("intro"));
    assert_eq!(playlist.producer().get_length(), 20);
}

#[test]
fn split_of_a_blank_yields_two_blanks() {
    let playlist = Playlist::new();
    playlist.blank(9).unwrap();
    playlist.split(0, 3).unwrap();
    assert_eq!(lengths(&playlist), vec![4, 6]);
    assert!(playlist.is_blank(0));
    assert!(playlist.is_blank(1));
}

#[test]
fn split_rejects_offsets_outside_the_clip() {
    let playlist = Playlist::new();
    playlist.append(&solid_producer(1, 10)).unwrap();
    assert!(playlist.split(0, 9).is_err());
    assert!(playlist.split(0, 20).is_err());
    assert!(playlist.split(3, 2).is_err());
    assert_eq!(playlist.count(), 1);
}

#[test]
fn split_at_clamps_outside_positions() {
    let playlist = Playlist::new();
    playlist.append(&solid_producer(1, 10)).unwrap();
    assert_eq!(playlist.split_at(-3, false), 0);
    assert_eq!(playlist.split_at(100, false), 10);
    assert_eq!(playlist.split_at(5, false), 5);
    assert_eq!(lengths(&playlist), vec![6, 4]);
}

#[test]
fn join_nests_clips_in_a_playlist() {
    let (playlist, ..) = three_clips();
    playlist.join(0, 1).unwrap();
    assert_eq!(playlist.count(), 2);
    assert_eq!(playlist.clip_length(0), 30);
    assert_eq!(playlist.producer().get_length(), 35);

    let nested = playlist
        .get_clip(0)
        .map(|p| p.cut_parent())
        .and_then(|p| Playlist::from_producer(&p))
        .unwrap();
    assert_eq!(nested.count(), 2);
    assert_eq!(nested.producer().get_length(), 30);
}

#[test]
fn consolidate_merges_blanks_and_drops_the_trailing_one() {
    let playlist = Playlist::new();
    playlist.blank(4).unwrap();
    playlist.blank(4).unwrap();
    playlist.append(&solid_producer(1, 10)).unwrap();
    playlist.blank(2).unwrap();

    playlist.consolidate_blanks(false).unwrap();
    assert_eq!(lengths(&playlist), vec![10, 10]);
    assert!(playlist.is_blank(0));
    assert_eq!(playlist.producer().get_length(), 20);
}

#[test]
fn consolidate_can_keep_the_length() {
    let playlist = Playlist::new();
    playlist.append(&solid_producer(1, 10)).unwrap();
    playlist.blank(2).unwrap();
    playlist.blank(2).unwrap();
    playlist.consolidate_blanks(true).unwrap();
    assert_eq!(lengths(&playlist), vec![10, 6]);
}

#[test]
fn replace_with_blank_keeps_the_duration() {
    let (playlist, a, ..) = three_clips();
    let taken = playlist.replace_with_blank(0).unwrap().unwrap();
    assert!(taken.cut_parent().ptr_eq(&a));
    assert!(playlist.is_blank(0));
    assert_eq!(lengths(&playlist), vec![10, 20, 5]);
    assert!(playlist.replace_with_blank(0).unwrap().is_none());
}

#[test]
fn insert_blank_shifts_later_clips() {
    let (playlist, a, ..) = three_clips();
    playlist.insert_blank(0, 3).unwrap();
    assert!(playlist.is_blank(0));
    assert!(playlist.get_clip(1).unwrap().cut_parent().ptr_eq(&a));
    assert_eq!(playlist.producer().get_length(), 39);
}

#[test]
fn pad_blanks_grows_and_removes() {
    let playlist = Playlist::new();
    playlist.append(&solid_producer(1, 10)).unwrap();
    playlist.blank(4).unwrap();
    playlist.append(&solid_producer(2, 10)).unwrap();

    playlist.pad_blanks(12, 3, false).unwrap();
    assert_eq!(lengths(&playlist), vec![10, 8, 10]);

    playlist.pad_blanks(12, -10, false).unwrap();
    assert_eq!(lengths(&playlist), vec![10, 10]);

    playlist.pad_blanks(3, 2, true).unwrap();
    assert_eq!(lengths(&playlist), vec![10, 3, 10]);
    assert!(playlist.is_blank(1));
}

#[test]
fn insert_at_splits_the_blank_around_the_clip() {
    let playlist = Playlist::new();
    playlist.blank(19).unwrap();
    let clip = solid_producer(9, 5);
    assert_eq!(playlist.insert_at(8, &clip, false).unwrap(), 1);
    assert_eq!(lengths(&playlist), vec![8, 5, 7]);
    assert_eq!(playlist.producer().get_length(), 20);
    assert_eq!(playlist.clip_start(1), 8);
    assert!(playlist.get_clip(1).unwrap().cut_parent().ptr_eq(&clip));
}

#[test]
fn insert_at_past_the_end_pads_when_overwriting() {
    let playlist = Playlist::new();
    playlist.append(&solid_producer(1, 10)).unwrap();
    let clip = solid_producer(2, 5);
    assert_eq!(playlist.insert_at(15, &clip, true).unwrap(), 2);
    assert_eq!(lengths(&playlist), vec![10, 5, 5]);
    assert!(playlist.is_blank(1));
    assert!(playlist.insert_at(-1, &clip, false).is_err());
}

#[test]
fn remove_region_cuts_across_clips() {
    let playlist = Playlist::new();
    for value in 1..=3 {
        playlist.append(&solid_producer(value, 10)).unwrap();
    }
    assert_eq!(playlist.remove_region(5, 10).unwrap(), 1);
    assert_eq!(lengths(&playlist), vec![5, 5, 10]);
    assert_eq!(playlist.producer().get_length(), 20);
    assert_eq!(playlist.get_clip(1).unwrap().get_in(), 5);
}

#[test]
fn clear_empties_the_timeline() {
    let (playlist, ..) = three_clips();
    playlist.clear();
    assert_eq!(playlist.count(), 0);
    assert_eq!(playlist.producer().get_length(), 0);
    assert_eq!(playlist.producer().get_out(), -1);
}
