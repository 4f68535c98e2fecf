use std::sync::{Arc, Mutex};

use super::*;
use crate::foundation::core::ServiceType;
use crate::frame::media::{Image, ImageFormat, ImageRequest};
use crate::multitrack::multitrack::Multitrack;
use crate::properties::events::{Event, EventKind};
use crate::testing::{solid_producer, source_value};

fn brighten(amount: u8) -> Filter {
    Filter::with_process(move |_filter: &Filter, frame: Frame| {
        frame.push_get_image(move |f: &Frame, req: &mut ImageRequest| {
            let image = f.get_image(*req)?;
            let data = image.data.iter().map(|b| b.saturating_add(amount)).collect();
            Ok(Image::new(image.format, image.width, image.height, data))
        });
        frame
    })
}

fn marking() -> Filter {
    Filter::with_process(|_filter: &Filter, frame: Frame| {
        frame.properties().set("filtered", 1);
        frame
    })
}

fn pixel(frame: &Frame) -> u8 {
    frame
        .get_image(ImageRequest::new(ImageFormat::Rgb24, 2, 2))
        .unwrap()
        .data[0]
}

#[test]
fn new_filter_defaults() {
    let filter = Filter::new();
    assert_eq!(filter.service().identify(), ServiceType::Filter);
    assert_eq!((filter.get_in(), filter.get_out(), filter.track()), (0, 0, 0));
    assert_eq!(
        filter.properties().get_int(keys::UNIQUE_ID),
        filter.id().0 as i64
    );
    assert_eq!(filter.length(), 0);
}

#[test]
fn attached_filter_transforms_the_image() {
    let producer = solid_producer(5, 10);
    producer.attach(&brighten(10)).unwrap();
    let frame = producer.get_frame(0);
    assert_eq!(pixel(&frame), 15);
}

#[test]
fn hookless_filter_passes_frames_through() {
    let producer = solid_producer(5, 10);
    producer.attach(&Filter::new()).unwrap();
    assert_eq!(pixel(&producer.get_frame(0)), 5);
}

#[test]
fn filters_only_run_inside_their_window() {
    let producer = solid_producer(1, 10);
    let filter = marking();
    filter.set_in_and_out(3, 5);
    producer.attach(&filter).unwrap();
    for position in 0..8 {
        producer.seek(position);
        let frame = producer.get_frame(0);
        assert_eq!(
            frame.properties().flag("filtered"),
            (3..=5).contains(&position),
            "position {position}"
        );
    }
}

#[test]
fn position_and_progress_are_relative_to_the_window() {
    let producer = solid_producer(1, 30);
    let filter = marking();
    filter.set_in_and_out(10, 19);
    producer.attach(&filter).unwrap();
    producer.seek(15);
    let frame = producer.get_frame(0);
    assert_eq!(filter.position(&frame), 5);
    assert_eq!(filter.length(), 10);
    assert!((filter.progress(&frame) - 0.5).abs() < 1e-9);
}

#[test]
fn open_window_measures_the_producer() {
    let producer = solid_producer(1, 10);
    let filter = marking();
    producer.attach(&filter).unwrap();
    producer.seek(4);
    let frame = producer.get_frame(0);
    assert_eq!(filter.length(), 0);
    assert_eq!(filter.length_for(&frame), 10);
    assert_eq!(filter.position(&frame), 4);
    assert!((filter.progress(&frame) - 0.4).abs() < 1e-9);
}

#[test]
fn progress_of_an_empty_window_is_zero() {
    let filter = marking();
    let frame = Frame::new(None);
    assert_eq!(filter.progress(&frame), 0.0);
}

#[test]
fn disabled_filters_are_skipped() {
    let producer = solid_producer(1, 10);
    let filter = marking();
    filter.properties().set(keys::DISABLE, 1);
    producer.attach(&filter).unwrap();
    assert!(!producer.get_frame(0).properties().flag("filtered"));

    let frame = Frame::new(None);
    frame.set_position(6);
    let frame = filter.process(frame);
    assert!(!frame.properties().flag("filtered"));
    assert_eq!(filter.position(&frame), 6);
}

#[test]
fn attach_and_detach_are_checked() {
    let producer = solid_producer(1, 10);
    let filter = marking();
    producer.attach(&filter).unwrap();
    assert!(producer.attach(&filter).is_err());
    assert!(producer.filter(0).unwrap().ptr_eq(&filter));
    producer.detach(&filter).unwrap();
    assert!(producer.filter(0).is_none());
    assert!(producer.detach(&filter).is_err());
}

#[test]
fn filter_property_changes_reach_the_host() {
    let producer = solid_producer(1, 10);
    let filter = marking();
    producer.attach(&filter).unwrap();
    let names = Arc::new(Mutex::new(Vec::new()));
    let n = Arc::clone(&names);
    producer
        .service()
        .events()
        .listen(None, EventKind::PropertyChanged, move |event| {
            if let Event::PropertyChanged(name) = event {
                n.lock().unwrap().push(name.clone());
            }
        });
    filter.service().set_property("level", 3);
    assert!(names.lock().unwrap().iter().any(|n| n == "level"));

    producer.detach(&filter).unwrap();
    names.lock().unwrap().clear();
    filter.service().set_property("level", 4);
    assert!(names.lock().unwrap().is_empty());
}

#[test]
fn graph_filter_processes_only_its_track() {
    let multitrack = Multitrack::new();
    multitrack.connect(&solid_producer(1, 10), 0).unwrap();
    multitrack.connect(&solid_producer(2, 10), 1).unwrap();
    let filter = marking();
    assert!(filter.connect(multitrack.service(), 1).unwrap().is_connected());
    assert_eq!(filter.track(), 1);

    let passed = filter.service().get_frame(0);
    assert_eq!(source_value(&passed), 1);
    assert!(!passed.properties().flag("filtered"));
    let processed = filter.service().get_frame(1);
    assert_eq!(source_value(&processed), 2);
    assert!(processed.properties().flag("filtered"));

    filter.properties().set(keys::TRACK, -1);
    assert!(filter.service().get_frame(0).properties().flag("filtered"));
}

#[test]
fn unconnected_filter_yields_an_empty_frame() {
    let frame = marking().service().get_frame(0);
    assert!(frame.is_test_card());
    assert!(!frame.properties().flag("filtered"));
}
