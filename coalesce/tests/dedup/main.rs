#[path = "../support.rs"]
mod support;

use bytes::Bytes;
use coalesce::{Classification, Client, Descriptor, Middleware, Phase, RequestOptions};
use coalesce_test::{assert_attempt, mock};
use http::StatusCode;
use std::sync::Arc;
use support::{get, post, Counter};

#[tokio::test(flavor = "current_thread")]
async fn identical_requests_share_one_attempt() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let first = client.request(get("http://example.com/items"), RequestOptions::new());
    let second = client.request(get("http://example.com/items"), RequestOptions::new());

    assert_eq!(first.key(), second.key());
    assert_ne!(first.handle(), second.handle());

    let (attempt, send_response) = assert_attempt!(handle, "GET", "http://example.com/items");
    assert_eq!(attempt.number(), 1);
    send_response.respond(200, "items");

    let (first, second) = (first.await.unwrap(), second.await.unwrap());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.body(), "items");

    assert_eq!(handle.calls(), 1);
    assert!(handle.try_next_request().is_none());
    assert_eq!(client.in_flight_len(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn failure_fans_out_to_every_waiter() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let client_errors = Counter::new();
    let errors = Counter::new();
    let successes = Counter::new();

    let futures: Vec<_> = (0..10)
        .map(|_| {
            let options = RequestOptions::new()
                .on_client_error({
                    let client_errors = client_errors.clone();
                    move |_| client_errors.hit()
                })
                .on_error({
                    let errors = errors.clone();
                    move |_| errors.hit()
                })
                .on_success({
                    let successes = successes.clone();
                    move |_| successes.hit()
                });
            client.request(get("http://example.com/missing"), options)
        })
        .collect();

    assert_eq!(client.get_in_flight(&futures[0]).unwrap().waiters, 10);

    let (_, send_response) = assert_attempt!(handle, "GET", "http://example.com/missing");
    send_response.respond(404, "not here");

    let mut results = Vec::new();
    for fut in futures {
        results.push(fut.await.unwrap_err());
    }

    for err in &results {
        assert_eq!(err.kind(), Classification::ClientStatus(StatusCode::NOT_FOUND));
        assert!(err.ptr_eq(&results[0]));
    }
    assert_eq!(results[0].response().unwrap().body(), "not here");
    assert_eq!(client_errors.get(), 10);
    assert_eq!(errors.get(), 10);
    assert_eq!(successes.get(), 0);
    assert_eq!(handle.calls(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn different_requests_do_not_share() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let a = client.request(get("http://example.com/a"), RequestOptions::new());
    let b = client.request(get("http://example.com/b"), RequestOptions::new());
    let c = client.request(post("http://example.com/a", "{}"), RequestOptions::new());

    assert_ne!(a.key(), b.key());
    assert_ne!(a.key(), c.key());
    assert_eq!(client.in_flight_len(), 3);

    let (_, a_response) = assert_attempt!(handle, "GET", "http://example.com/a");
    let (_, b_response) = assert_attempt!(handle, "GET", "http://example.com/b");
    let (_, c_response) = assert_attempt!(handle, "POST", "http://example.com/a");

    b_response.respond(200, "b");
    c_response.respond(201, "c");
    a_response.respond(200, "a");

    assert_eq!(a.await.unwrap().body(), "a");
    assert_eq!(b.await.unwrap().body(), "b");
    assert_eq!(c.await.unwrap().status(), StatusCode::CREATED);
    assert_eq!(handle.calls(), 3);
}

#[tokio::test(flavor = "current_thread")]
async fn settled_entry_is_replaced_by_a_fresh_one() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let first = client.request(get("http://example.com/"), RequestOptions::new());
    let (_, send_response) = assert_attempt!(handle, "GET", "http://example.com/");
    send_response.respond(200, "first");
    let first = first.await.unwrap();

    assert!(client
        .get_in_flight(client.key_of(&get("http://example.com/")))
        .is_none());

    let second = client.request(get("http://example.com/"), RequestOptions::new());
    let (attempt, send_response) = assert_attempt!(handle, "GET", "http://example.com/");
    assert_eq!(attempt.number(), 1);
    send_response.respond(200, "second");

    let second = second.await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(handle.calls(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn entry_parameters_are_fixed_at_creation() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let strict = client.request(get("http://example.com/"), RequestOptions::new().retry(0));
    let lenient = client.request(get("http://example.com/"), RequestOptions::new().retry(5));

    let snapshot = client.get_in_flight(&lenient).unwrap();
    assert_eq!(snapshot.retries_remaining, 0);
    assert_eq!(snapshot.waiters, 2);

    let (_, send_response) = assert_attempt!(handle, "GET", "http://example.com/");
    send_response.respond(503, "");

    let strict = strict.await.unwrap_err();
    let lenient = lenient.await.unwrap_err();
    assert!(strict.ptr_eq(&lenient));
    assert_eq!(strict.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(handle.calls(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn in_flight_snapshot() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let fut = client.request(
        get("http://example.com/"),
        RequestOptions::new()
            .retry(2)
            .timeout(std::time::Duration::from_secs(30)),
    );

    let snapshot = client.get_in_flight(&fut).unwrap();
    assert_eq!(snapshot.key, fut.key());
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.attempts, 0);
    assert_eq!(snapshot.retries_remaining, 2);
    assert!(snapshot.last_error.is_none());

    let (_, send_response) = assert_attempt!(handle, "GET", "http://example.com/");

    let snapshot = client.get_in_flight(fut.key()).unwrap();
    assert_eq!(snapshot.phase, Phase::Attempting);
    assert_eq!(snapshot.attempts, 1);
    assert_eq!(snapshot.timeout, Some(std::time::Duration::from_secs(30)));
    assert_eq!(snapshot.cancelled_by, None);
    assert_eq!(*snapshot.descriptor, get("http://example.com/"));
    assert_eq!(
        client.get_request(&fut).unwrap().uri(),
        "http://example.com/"
    );

    send_response.respond(200, "");
    fut.await.unwrap();
}

#[tokio::test(flavor = "current_thread")]
async fn key_headers_split_otherwise_identical_requests() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let alice = get("http://example.com/me").with_header(
        http::header::AUTHORIZATION,
        http::HeaderValue::from_static("Bearer alice"),
    );
    let bob = get("http://example.com/me").with_header(
        http::header::AUTHORIZATION,
        http::HeaderValue::from_static("Bearer bob"),
    );
    // Not a key header by default.
    let alice_again = alice.clone().with_header(
        http::header::USER_AGENT,
        http::HeaderValue::from_static("test"),
    );

    let a = client.request(alice, RequestOptions::new());
    let b = client.request(bob, RequestOptions::new());
    let a2 = client.request(alice_again, RequestOptions::new());

    assert_ne!(a.key(), b.key());
    assert_eq!(a.key(), a2.key());

    let (attempt, alice_response) = assert_attempt!(handle, "GET", "http://example.com/me");
    assert_eq!(
        attempt.descriptor().headers()[http::header::AUTHORIZATION],
        "Bearer alice"
    );
    let (_, bob_response) = assert_attempt!(handle, "GET", "http://example.com/me");

    alice_response.respond(200, "alice");
    bob_response.respond(200, "bob");

    assert_eq!(a.await.unwrap().body(), "alice");
    assert_eq!(a2.await.unwrap().body(), "alice");
    assert_eq!(b.await.unwrap().body(), "bob");
    assert_eq!(handle.calls(), 2);
}

struct Unwrap404;

impl Middleware for Unwrap404 {
    fn on_response(&self, mut response: http::Response<Bytes>) -> http::Response<Bytes> {
        if response.status() == StatusCode::NOT_FOUND {
            *response.status_mut() = StatusCode::OK;
            *response.body_mut() = Bytes::from_static(b"[]");
        }
        response
    }
}

#[tokio::test(flavor = "current_thread")]
async fn middleware_runs_before_keying_and_classification() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::builder()
        .middleware(|d: Descriptor| d.with_uri("http://api.example.com/v2/list".parse().unwrap()))
        .middleware(Unwrap404)
        .build(transport);

    let a = client.request(get("http://example.com/old"), RequestOptions::new());
    let b = client.request(get("http://example.com/other"), RequestOptions::new());
    assert_eq!(a.key(), b.key());

    let (_, send_response) = assert_attempt!(handle, "GET", "http://api.example.com/v2/list");
    send_response.respond(404, "");

    assert_eq!(a.await.unwrap().body(), "[]");
    assert_eq!(b.await.unwrap().status(), StatusCode::OK);
}
