#[path = "../support.rs"]
mod support;

use coalesce::{AbortSource, Classification, Client, Phase, RequestOptions};
use coalesce_test::{assert_attempt, mock};
use std::time::Duration;
use support::{get, Counter};

#[tokio::test(flavor = "current_thread")]
async fn aborting_one_waiter_aborts_its_siblings() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let aborts = Counter::new();
    let retries = Counter::new();
    let options = RequestOptions::new()
        .retry(3)
        .on_abort({
            let aborts = aborts.clone();
            move |_| aborts.hit()
        })
        .on_retry({
            let retries = retries.clone();
            move |_| retries.hit()
        });

    let first = client.request(get("http://example.com/"), options.clone());
    let second = client.request(get("http://example.com/"), options);

    let (attempt, _send_response) = assert_attempt!(handle, "GET", "http://example.com/");
    assert!(client.abort(&first));
    assert!(attempt.token().is_cancelled());

    let first = first.await.unwrap_err();
    let second = second.await.unwrap_err();

    assert!(first.is_aborted());
    assert!(second.ptr_eq(&first));
    assert_eq!(aborts.get(), 2);
    assert_eq!(retries.get(), 0);
    assert_eq!(handle.calls(), 1);
    assert!(handle.try_next_request().is_none());
    assert_eq!(client.in_flight_len(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn abort_by_key_with_reason() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let fut = client.request(get("http://example.com/"), RequestOptions::new());
    let (_attempt, _send_response) = assert_attempt!(handle, "GET", "http://example.com/");

    assert!(client.abort_with(fut.key(), "navigated away"));

    let err = fut.await.unwrap_err();
    assert_eq!(err.kind(), Classification::Aborted);
    assert_eq!(err.reason(), Some("navigated away"));
    assert_eq!(err.to_string(), "request aborted: navigated away");
}

#[tokio::test(flavor = "current_thread")]
async fn abort_before_first_attempt_skips_transport() {
    let _t = support::trace_init();

    let (transport, handle) = mock::pair();
    let client = Client::new(transport);

    let fut = client.request(get("http://example.com/"), RequestOptions::new().retry(2));
    assert!(client.abort(&fut));

    assert!(fut.await.unwrap_err().is_aborted());
    assert_eq!(handle.calls(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn abort_after_settlement_is_a_no_op() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let fut = client.request(get("http://example.com/"), RequestOptions::new());
    let key = fut.key();
    let handle_id = fut.handle();

    let (_, send_response) = assert_attempt!(handle, "GET", "http://example.com/");
    send_response.respond(200, "done");
    fut.await.unwrap();

    assert!(!client.abort(key));
    assert!(!client.abort(handle_id));
}

#[tokio::test(flavor = "current_thread")]
async fn external_abort_source() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let source = AbortSource::new();
    let fut = client.request(
        get("http://example.com/"),
        RequestOptions::new().retry(2).abort_source(source.clone()),
    );
    let sibling = client.request(get("http://example.com/"), RequestOptions::new());

    let (_attempt, _send_response) = assert_attempt!(handle, "GET", "http://example.com/");
    source.abort_with("component unmounted");

    let err = fut.await.unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(err.reason(), Some("component unmounted"));
    assert!(sibling.await.unwrap_err().is_aborted());
    assert_eq!(handle.calls(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn abort_during_backoff() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::builder()
        .backoff(|_attempt: u32| Duration::from_secs(10))
        .build(transport);

    let retries = Counter::new();
    let fut = client.request(
        get("http://example.com/"),
        RequestOptions::new().retry(3).on_retry({
            let retries = retries.clone();
            move |_| retries.hit()
        }),
    );

    let (_, send_response) = assert_attempt!(handle, "GET", "http://example.com/");
    send_response.respond(503, "");

    while client.get_in_flight(&fut).map(|s| s.phase) != Some(Phase::Retrying) {
        tokio::task::yield_now().await;
    }
    assert_eq!(retries.get(), 1);

    let start = tokio::time::Instant::now();
    assert!(client.abort(&fut));

    let err = fut.await.unwrap_err();
    assert!(err.is_aborted());
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(handle.calls(), 1);
    assert!(handle.try_next_request().is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn abort_does_not_cross_keys() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let a = client.request(get("http://example.com/a"), RequestOptions::new());
    let b = client.request(get("http://example.com/b"), RequestOptions::new());

    let (a_attempt, _a_response) = assert_attempt!(handle, "GET", "http://example.com/a");
    let (b_attempt, b_response) = assert_attempt!(handle, "GET", "http://example.com/b");

    assert!(client.abort(&a));
    assert!(a.await.unwrap_err().is_aborted());

    assert!(a_attempt.token().is_cancelled());
    assert!(!b_attempt.token().is_cancelled());
    let snapshot = client.get_in_flight(&b).unwrap();
    assert_eq!(snapshot.cancelled_by, None);
    assert_eq!(snapshot.phase, Phase::Attempting);

    b_response.respond(200, "b");
    assert_eq!(b.await.unwrap().body(), "b");
}

#[tokio::test(flavor = "current_thread")]
async fn abort_wins_over_a_late_failure() {
    let _t = support::trace_init();

    let (transport, mut handle) = mock::pair();
    let client = Client::new(transport);

    let fut = client.request(get("http://example.com/"), RequestOptions::new().retry(1));
    let (_, send_response) = assert_attempt!(handle, "GET", "http://example.com/");

    // The transport reports its own failure after the abort was requested.
    assert!(client.abort(&fut));
    send_response.send_error(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "reset",
    ));

    let err = fut.await.unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(handle.calls(), 1);
}
