//! Behavior every backend must share, run against each backend's stores.
//!
//! Suites expect an empty store.

use lastmile_core::{
    ErrorCode, LatLng, PageToken, RecordStore, RequestContext, RiderProfile, Station, UpsertStore,
};

pub(crate) fn rider(id: &str) -> RiderProfile {
    RiderProfile {
        rider_id: id.to_string(),
        name: format!("rider {id}"),
        phone: "+1-555-0100".to_string(),
    }
}

pub(crate) fn station(id: &str) -> Station {
    Station {
        station_id: id.to_string(),
        name: format!("station {id}"),
        location: Some(LatLng {
            latitude: 12.9716,
            longitude: 77.5946,
        }),
        nearby_area_ids: vec!["area-1".to_string(), "area-2".to_string()],
    }
}

pub(crate) async fn rider_store_suite<S: RecordStore<RiderProfile>>(store: &S) {
    let ctx = RequestContext::new("conformance", "");

    // Creation is exclusive per key.
    let original = rider("b");
    store.create(&ctx, &original).await.unwrap();
    let err = store.create(&ctx, &original).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyExists);

    // Reads return an independent, equal copy.
    let mut fetched = store.get(&ctx, "b").await.unwrap();
    assert_eq!(fetched, original);
    fetched.name.push_str(" (edited)");
    assert_eq!(store.get(&ctx, "b").await.unwrap(), original);

    // Validation and missing keys.
    assert_eq!(
        store.create(&ctx, &rider("")).await.unwrap_err().code(),
        ErrorCode::InvalidArgument
    );
    let mut blank = rider("z");
    blank.name = String::new();
    assert_eq!(
        store.create(&ctx, &blank).await.unwrap_err().code(),
        ErrorCode::InvalidArgument
    );
    assert_eq!(
        store.get(&ctx, "").await.unwrap_err().code(),
        ErrorCode::InvalidArgument
    );
    assert_eq!(
        store.get(&ctx, "missing").await.unwrap_err().code(),
        ErrorCode::NotFound
    );

    // Insertion order must not leak into listing order.
    store.create(&ctx, &rider("c")).await.unwrap();
    store.create(&ctx, &rider("a")).await.unwrap();

    let first = store.list(&ctx, 0, 2).await.unwrap();
    let ids: Vec<_> = first.items.iter().map(|r| r.rider_id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);
    assert_eq!(first.next_token(), "2");

    let second = store.list(&ctx, 2, 2).await.unwrap();
    let ids: Vec<_> = second.items.iter().map(|r| r.rider_id.as_str()).collect();
    assert_eq!(ids, ["c"]);
    assert_eq!(second.next_token(), "");

    let beyond = store.list(&ctx, 100, 10).await.unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.next_offset, None);

    assert_eq!(
        store.list(&ctx, -1, 10).await.unwrap_err().code(),
        ErrorCode::InvalidArgument
    );
    assert_eq!(
        store.list(&ctx, 0, 0).await.unwrap_err().code(),
        ErrorCode::InvalidArgument
    );

    // Walking tokens from "" to "" visits every key once, in order.
    let mut visited = Vec::new();
    let mut token = String::new();
    loop {
        let offset = PageToken::decode(&token).unwrap();
        let page = store.list(&ctx, offset, 1).await.unwrap();
        visited.extend(page.items.iter().map(|r| r.rider_id.clone()));
        token = page.next_token();
        if token.is_empty() {
            break;
        }
    }
    assert_eq!(visited, ["a", "b", "c"]);
}

pub(crate) async fn station_store_suite<S: UpsertStore<Station>>(store: &S) {
    let ctx = RequestContext::new("conformance", "");

    let mut central = station("st-2");
    store.upsert(&ctx, &central).await.unwrap();
    store.upsert(&ctx, &central).await.unwrap();
    assert_eq!(store.get(&ctx, "st-2").await.unwrap(), central);

    central.name = "renamed".to_string();
    central.nearby_area_ids.clear();
    store.upsert(&ctx, &central).await.unwrap();
    assert_eq!(store.get(&ctx, "st-2").await.unwrap(), central);

    assert_eq!(
        store.upsert(&ctx, &station("")).await.unwrap_err().code(),
        ErrorCode::InvalidArgument
    );

    store.upsert(&ctx, &station("st-1")).await.unwrap();
    let page = store.list(&ctx, 0, 10).await.unwrap();
    let ids: Vec<_> = page.items.iter().map(|s| s.station_id.as_str()).collect();
    assert_eq!(ids, ["st-1", "st-2"]);
    assert_eq!(page.next_offset, None);

    // Create still refuses an occupied key on an upsert-capable store.
    assert_eq!(
        store.create(&ctx, &station("st-1")).await.unwrap_err().code(),
        ErrorCode::AlreadyExists
    );
}
