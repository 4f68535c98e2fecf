use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::frame::frame::Frame;
use crate::frame::media::{Image, ImageFormat, ImageRequest};
use crate::properties::events::EventKind;
use crate::testing::solid_producer;

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

fn tractor_with_tracks() -> Tractor {
    let tractor = Tractor::new();
    tractor.set_track(&solid_producer(1, 10), 0).unwrap();
    tractor.set_track(&solid_producer(2, 10), 1).unwrap();
    tractor
}

fn pixel(tractor: &Tractor) -> u8 {
    tractor.producer().seek(0);
    tractor
        .producer()
        .get_frame(0)
        .get_image(ImageRequest::new(ImageFormat::Rgb24, 2, 2))
        .unwrap()
        .data[0]
}

#[test]
fn field_starts_at_the_multitrack() {
    let tractor = tractor_with_tracks();
    let field = tractor.field().unwrap();
    assert!(field.tip().ptr_eq(field.multitrack().service()));
    assert!(field.tractor().unwrap().service().ptr_eq(tractor.service()));
}

#[test]
fn planting_moves_the_tip_and_notifies() {
    let tractor = tractor_with_tracks();
    let field = tractor.field().unwrap();
    let changes = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&changes);
    tractor
        .service()
        .events()
        .listen(None, EventKind::ServiceChanged, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

    let filter = brighten(10);
    field.plant_filter(&filter, 1).unwrap();
    assert!(field.tip().ptr_eq(filter.service()));
    assert!(tractor.service().get_producer().unwrap().ptr_eq(filter.service()));
    assert!(filter.service().producer().unwrap().ptr_eq(field.multitrack().service()));
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert_eq!(pixel(&tractor), 12);
}

#[test]
fn filters_on_other_tracks_leave_the_top_alone() {
    let tractor = tractor_with_tracks();
    let field = tractor.field().unwrap();
    field.plant_filter(&brighten(10), 0).unwrap();
    assert_eq!(pixel(&tractor), 2);
}

#[test]
fn later_plants_see_earlier_output() {
    let tractor = tractor_with_tracks();
    let field = tractor.field().unwrap();
    let first = brighten(10);
    let second = brighten(20);
    field.plant_filter(&first, 1).unwrap();
    field.plant_filter(&second, 1).unwrap();
    assert!(second.service().producer().unwrap().ptr_eq(first.service()));
    assert_eq!(pixel(&tractor), 32);
}

#[test]
fn planting_the_tip_again_fails() {
    let tractor = tractor_with_tracks();
    let field = tractor.field().unwrap();
    let filter = brighten(10);
    field.plant_filter(&filter, 1).unwrap();
    assert!(field.plant_filter(&filter, 1).is_err());
    assert!(field.tip().ptr_eq(filter.service()));
}

#[test]
fn plant_transition_connects_both_tracks() {
    let tractor = tractor_with_tracks();
    let field = tractor.field().unwrap();
    let transition = Transition::new();
    field.plant_transition(&transition, 0, 1).unwrap();
    assert!(field.tip().ptr_eq(transition.service()));
    assert_eq!((transition.a_track(), transition.b_track()), (0, 1));
    assert_eq!(pixel(&tractor), 2);
}

#[test]
fn disconnecting_a_middle_service_rewires_its_consumer() {
    let tractor = tractor_with_tracks();
    let field = tractor.field().unwrap();
    let first = brighten(10);
    let second = brighten(20);
    field.plant_filter(&first, 1).unwrap();
    field.plant_filter(&second, 1).unwrap();

    field.disconnect_service(first.service()).unwrap();
    assert!(second.service().producer().unwrap().ptr_eq(field.multitrack().service()));
    assert!(field.tip().ptr_eq(second.service()));
    assert_eq!(pixel(&tractor), 22);
}

#[test]
fn disconnecting_the_tip_moves_it_down() {
    let tractor = tractor_with_tracks();
    let field = tractor.field().unwrap();
    let filter = brighten(10);
    field.plant_filter(&filter, 1).unwrap();

    field.disconnect_service(filter.service()).unwrap();
    assert!(field.tip().ptr_eq(field.multitrack().service()));
    assert!(tractor.service().get_producer().unwrap().ptr_eq(field.multitrack().service()));
    assert_eq!(pixel(&tractor), 2);
}

#[test]
fn disconnecting_an_unplanted_service_fails() {
    let tractor = tractor_with_tracks();
    let field = tractor.field().unwrap();
    assert!(field.disconnect_service(brighten(1).service()).is_err());
}
