//! Request descriptors.
//!
//! A [`Descriptor`] is the caller's immutable description of a request. The
//! [`Client`](crate::Client) never mutates a descriptor it was handed; request
//! middleware produces new descriptors instead.

use bytes::Bytes;
use http::{header::HeaderName, HeaderMap, HeaderValue, Method, Uri};

/// Method, URI, headers and body of a logical request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Descriptor {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl Descriptor {
    /// Creates a descriptor with no headers and an empty body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Descriptor {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Shorthand for a `GET` descriptor.
    pub fn get(uri: Uri) -> Self {
        Descriptor::new(Method::GET, uri)
    }

    /// Shorthand for a `POST` descriptor carrying `body`.
    pub fn post(uri: Uri, body: impl Into<Bytes>) -> Self {
        Descriptor::new(Method::POST, uri).with_body(body)
    }

    /// Appends a header value, keeping any existing values for `name`.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Replaces the URI.
    pub fn with_uri(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the headers, for middleware.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Builds an `http::Request` for a transport to send.
    pub fn to_request(&self) -> http::Request<Bytes> {
        let mut request = http::Request::new(self.body.clone());
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();
        request
    }
}

impl From<http::Request<Bytes>> for Descriptor {
    fn from(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Descriptor {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        }
    }
}
