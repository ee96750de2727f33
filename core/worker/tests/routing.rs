mod common;

use common::*;
use harbor_cache::Purpose;
use harbor_common::{Method, Request, ResponseSource};
use harbor_net::ScriptedFetcher;
use harbor_sync::MemoryQueue;
use harbor_worker::{Event, EventOutcome, FetchDisposition, Worker};
use proptest::prelude::*;
use std::sync::Arc;

#[tokio::test]
async fn same_origin_success_is_cached() {
    let h = Harness::new("v1");
    h.fetcher.respond_ok("https://app.example/app.js", "console.log(1)");

    let request = Request::get(url("https://app.example/app.js"));
    let response = h.host.respond(request.clone()).await.unwrap();
    assert_eq!(response.text(), "console.log(1)");

    let cached = h
        .worker()
        .namespace()
        .handle(Purpose::Shell)
        .match_request(&request)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.body, response.body);
}

#[tokio::test]
async fn offline_navigation_falls_back_to_offline_document() {
    let h = Harness::new("v1");
    script_shell(&h.fetcher);
    h.host.dispatch(Event::Install).await.unwrap();

    h.fetcher.set_offline(true);
    let response = h
        .host
        .respond(Request::navigate(url("https://app.example/never-visited")))
        .await
        .unwrap();
    assert_eq!(response.text(), "<h1>You are offline</h1>");
    assert_eq!(response.source, ResponseSource::Cache);
}

#[tokio::test]
async fn offline_navigation_without_document_is_503() {
    let h = Harness::new("v1");
    h.fetcher.set_offline(true);

    let response = h
        .host
        .respond(Request::navigate(url("https://app.example/never-visited")))
        .await
        .unwrap();
    assert_eq!(response.status, 503);
    assert_eq!(
        response.json().unwrap(),
        serde_json::json!({ "error": "Offline: Unable to load resource" })
    );
}

#[tokio::test]
async fn cross_origin_hit_makes_no_network_call() {
    let h = Harness::new("v1");
    h.fetcher.respond_ok("https://api.example/profile", r#"{"name":"a"}"#);

    let request = Request::get(url("https://api.example/profile"));
    let first = h.host.respond(request.clone()).await.unwrap();
    assert_eq!(h.fetcher.total_calls(), 1);

    let second = h.host.respond(request).await.unwrap();
    assert_eq!(h.fetcher.total_calls(), 1);
    assert_eq!(second.status, first.status);
    assert_eq!(second.body, first.body);
    assert_eq!(second.source, ResponseSource::Cache);
}

fn mutating_method() -> impl Strategy<Value = Method> {
    prop_oneof![
        Just(Method::Post),
        Just(Method::Put),
        Just(Method::Delete),
        Just(Method::Patch),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn mutations_never_touch_the_cache(
        method in mutating_method(),
        cross_origin in any::<bool>(),
        path in "[a-z0-9]{1,12}",
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let store = TrackingStore::default();
        let worker = Worker::new(
            config("v1"),
            Arc::new(store.clone()),
            Arc::new(MemoryQueue::new()),
            Arc::new(ScriptedFetcher::new()),
        )
        .unwrap();

        let host = if cross_origin { "https://api.example/" } else { SCOPE };
        let request = Request::new(method, url(&format!("{}{}", host, path)));
        let disposition = runtime.block_on(worker.handle_fetch(&request));

        prop_assert_eq!(disposition, FetchDisposition::PassThrough);
        prop_assert_eq!(store.calls(), 0);
    }
}

#[tokio::test]
async fn get_uses_the_cache() {
    let store = TrackingStore::default();
    let fetcher = ScriptedFetcher::new();
    fetcher.respond_ok("https://app.example/", "home");
    let worker = Arc::new(
        Worker::new(
            config("v1"),
            Arc::new(store.clone()),
            Arc::new(MemoryQueue::new()),
            Arc::new(fetcher),
        )
        .unwrap(),
    );
    let host = harbor_worker::WorkerHost::new(worker);

    let outcome = host.dispatch(Event::Fetch(Request::get(url(SCOPE)))).await.unwrap();
    assert!(matches!(outcome, EventOutcome::Fetch(FetchDisposition::Respond(_))));
    assert!(store.calls() > 0);
}
