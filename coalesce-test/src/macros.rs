/// Asserts that the mock handle receives a new attempt for the given method
/// and URI.
///
/// Must be used inside an `async` context. On success, the [`Attempt`] and the
/// [`SendResponse`] handle for it are returned, allowing the caller to respond.
/// On failure, the macro panics.
///
/// # Examples
///
/// ```rust
/// use coalesce::{Client, Descriptor, RequestOptions};
/// use coalesce_test::{assert_attempt, mock};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (transport, mut handle) = mock::pair();
/// let client = Client::new(transport);
///
/// let fut = client.request(
///     Descriptor::get("http://example.com/".parse().unwrap()),
///     RequestOptions::new(),
/// );
///
/// let (_attempt, send_response) = assert_attempt!(handle, "GET", "http://example.com/");
/// send_response.respond(200, "world");
///
/// assert_eq!(fut.await.unwrap().body(), "world");
/// # }
/// ```
///
/// [`Attempt`]: coalesce::Attempt
/// [`SendResponse`]: crate::mock::SendResponse
#[macro_export]
macro_rules! assert_attempt {
    ($mock_handle:expr, $method:expr, $uri:expr) => {
        $crate::assert_attempt!($mock_handle, $method, $uri,)
    };
    ($mock_handle:expr, $method:expr, $uri:expr, $($arg:tt)*) => {{
        let (attempt, send_response) = match $mock_handle.next_request().await {
            Some(r) => r,
            None => panic!("expected an attempt but none was received."),
        };

        assert_eq!(attempt.descriptor().method().as_str(), $method, $($arg)*);
        assert_eq!(attempt.descriptor().uri().to_string(), $uri, $($arg)*);
        (attempt, send_response)
    }};
}
