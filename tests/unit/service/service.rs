use super::*;
use crate::frame::media::{ImageFormat, ImageRequest};
use crate::testing::{solid_producer, source_value};

fn marking() -> Filter {
    Filter::with_process(|_filter: &Filter, frame: Frame| {
        frame.properties().set("filtered", 1);
        frame
    })
}

#[test]
fn connecting_past_the_end_grows_the_inputs() {
    let service = Service::new();
    let p = solid_producer(1, 10);
    let status = service.connect_producer(p.service(), 2).unwrap();
    assert!(status.is_connected());
    assert_eq!(service.input_count(), 3);
    assert!(service.input_capacity() >= 3);
    assert!(service.input(0).is_none());
    assert!(service.input(2).unwrap().ptr_eq(p.service()));
    assert!(p.service().consumer().unwrap().ptr_eq(&service));
}

#[test]
fn minus_one_means_the_first_slot() {
    let service = Service::new();
    let p = solid_producer(1, 10);
    service.connect_producer(p.service(), -1).unwrap();
    assert!(service.input(0).unwrap().ptr_eq(p.service()));
    assert!(service.connect_producer(p.service(), -2).is_err());
}

#[test]
fn a_producer_connects_once() {
    let service = Service::new();
    let p = solid_producer(1, 10);
    service.connect_producer(p.service(), 0).unwrap();
    let status = service.connect_producer(p.service(), 1).unwrap();
    assert_eq!(status, ConnectStatus::AlreadyConnected);
    assert_eq!(service.input_count(), 1);
}

#[test]
fn a_service_cannot_consume_itself() {
    let service = Service::new();
    assert!(service.connect_producer(&service, 0).is_err());
    assert_eq!(service.input_count(), 0);
}

#[test]
fn replacing_an_input_releases_its_consumer() {
    let service = Service::new();
    let a = solid_producer(1, 10);
    let b = solid_producer(2, 10);
    service.connect_producer(a.service(), 0).unwrap();
    service.connect_producer(b.service(), 0).unwrap();
    assert!(a.service().consumer().is_none());
    assert!(b.service().consumer().unwrap().ptr_eq(&service));
}

#[test]
fn producer_is_the_last_input_and_get_producer_the_first() {
    let service = Service::new();
    assert!(service.producer().is_none());
    let a = solid_producer(1, 10);
    let b = solid_producer(2, 10);
    service.connect_producer(a.service(), 0).unwrap();
    service.connect_producer(b.service(), 1).unwrap();
    assert!(service.get_producer().unwrap().ptr_eq(a.service()));
    assert!(service.producer().unwrap().ptr_eq(b.service()));
}

#[test]
fn insert_shifts_later_inputs() {
    let service = Service::new();
    let a = solid_producer(1, 10);
    let b = solid_producer(2, 10);
    let c = solid_producer(3, 10);
    service.connect_producer(a.service(), 0).unwrap();
    service.connect_producer(b.service(), 1).unwrap();
    service.insert_producer(c.service(), 0).unwrap();
    assert_eq!(service.input_count(), 3);
    assert!(service.input(0).unwrap().ptr_eq(c.service()));
    assert!(service.input(2).unwrap().ptr_eq(b.service()));
    assert!(c.service().consumer().unwrap().ptr_eq(&service));

    let d = solid_producer(4, 10);
    service.insert_producer(d.service(), 5).unwrap();
    assert_eq!(service.input_count(), 6);
    assert!(service.input(4).is_none());
}

#[test]
fn disconnect_compacts_the_inputs() {
    let service = Service::new();
    let producers: Vec<_> = (1..=3).map(|v| solid_producer(v, 10)).collect();
    for (slot, p) in producers.iter().enumerate() {
        service.connect_producer(p.service(), slot as i32).unwrap();
    }
    service.disconnect_producer(1).unwrap();
    assert_eq!(service.input_count(), 2);
    assert!(service.input(1).unwrap().ptr_eq(producers[2].service()));
    assert!(producers[1].service().consumer().is_none());
    assert!(producers[0].service().consumer().is_some());

    let err = service.disconnect_producer(5).unwrap_err();
    assert!(matches!(err, EngineError::InvalidIndex { .. }));

    service.disconnect_all_producers();
    assert_eq!(service.input_count(), 0);
    assert!(producers[0].service().consumer().is_none());
}

#[test]
fn type_comes_from_the_resource_then_the_type_tag() {
    let service = Service::new();
    assert_eq!(service.identify(), ServiceType::Unknown);
    service.properties().set(keys::MLT_TYPE, "consumer");
    assert_eq!(service.identify(), ServiceType::Consumer);
    service.properties().set(keys::RESOURCE, "<playlist>");
    assert_eq!(service.identify(), ServiceType::Playlist);
    assert_eq!(solid_producer(1, 1).service().identify(), ServiceType::Producer);
}

#[test]
fn base_service_forwards_by_index() {
    let service = Service::new();
    service.connect_producer(solid_producer(1, 10).service(), 0).unwrap();
    service.connect_producer(solid_producer(2, 10).service(), 1).unwrap();
    assert_eq!(source_value(&service.get_frame(1)), 2);
    assert_eq!(source_value(&service.get_frame(0)), 1);

    let missing = service.get_frame(4);
    assert!(missing.is_test_card());
    assert_eq!(missing.properties().get_int(keys::WIDTH), i64::from(service.profile().width));
}

#[test]
fn frames_record_the_services_they_pass() {
    let service = Service::new();
    let p = solid_producer(1, 10);
    service.connect_producer(p.service(), 0).unwrap();
    let frame = service.get_frame(0);
    let visited = frame.visited();
    assert_eq!(visited.len(), 2);
    assert!(visited[0].ptr_eq(p.service()));
    assert!(visited[1].ptr_eq(&service));
}

#[test]
fn attached_filters_run_on_every_frame() {
    let service = Service::new();
    service.connect_producer(solid_producer(1, 10).service(), 0).unwrap();
    let filter = marking();
    service.attach(&filter).unwrap();
    assert_eq!(service.filter_count(), 1);
    assert!(service.get_frame(0).properties().flag("filtered"));

    service.detach(&filter).unwrap();
    assert_eq!(service.filter_count(), 0);
    assert!(!service.get_frame(0).properties().flag("filtered"));
}

#[test]
fn private_filters_only_run_when_applied_directly() {
    let service = Service::new();
    service.connect_producer(solid_producer(1, 10).service(), 0).unwrap();
    service.attach(&marking()).unwrap();
    service.properties().set(keys::FILTER_PRIVATE, 1);

    let frame = service.get_frame(0);
    assert!(!frame.properties().flag("filtered"));
    service.apply_filters(&frame, 0);
    assert!(frame.properties().flag("filtered"));
}

#[test]
fn attach_fires_service_changed() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let service = Service::new();
    let changes = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&changes);
    service.events().listen(None, EventKind::ServiceChanged, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    let filter = marking();
    service.attach(&filter).unwrap();
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    filter.service().fire(&Event::ServiceChanged);
    assert_eq!(changes.load(Ordering::SeqCst), 2);
    service.detach(&filter).unwrap();
    assert_eq!(changes.load(Ordering::SeqCst), 3);
}

#[test]
fn failing_producers_yield_placeholders() {
    let producer = Producer::with_hook(|_p: &Producer, _index: i32| -> EngineResult<Frame> {
        Err(EngineError::timeline("broken source"))
    });
    let frame = producer.service().get_frame(0);
    assert!(frame.is_test_card());
    let image = frame
        .get_image(ImageRequest::new(ImageFormat::Rgb24, 2, 2))
        .unwrap();
    assert_eq!(image.width, 2);
}

#[test]
fn cache_entries_belong_to_their_service() {
    let a = Service::new();
    let b = Service::new();
    a.cache_put("unit.service.cache", CacheItem::new(7u32, 1));
    assert_eq!(
        a.cache_get("unit.service.cache").unwrap().data::<u32>().as_deref(),
        Some(&7)
    );
    assert!(b.cache_get("unit.service.cache").is_none());

    a.cache_purge();
    assert!(a.cache_get("unit.service.cache").is_none());

    b.cache_set_size("unit.service.sized", 3);
    assert_eq!(b.cache_get_size("unit.service.sized"), 3);
}

#[test]
fn dropping_a_service_purges_its_cache() {
    let service = Service::new();
    let id = service.id();
    service.cache_put("unit.service.drop", CacheItem::new(1u8, 1));
    drop(service);
    assert!(cache::get("unit.service.drop", id).is_none());
}

#[test]
fn explicit_profile_overrides_the_default() {
    let service = Service::new();
    assert!(service.explicit_profile().is_none());
    let profile = Profile {
        width: 320,
        height: 240,
        ..Profile::default()
    };
    service.set_profile(Arc::new(profile));
    assert_eq!(service.profile().width, 320);
    assert_eq!(Frame::new(Some(&service)).properties().get_int(keys::HEIGHT), 240);
}
