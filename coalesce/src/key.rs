//! Dedup identity of a request.

use crate::descriptor::Descriptor;
use http::header::{self, HeaderName};
use http::Uri;
use sha2::{Digest, Sha256};
use std::fmt;

/// A stable digest identifying "the same logical request".
///
/// Two descriptors with the same method, normalized URI, body and values for
/// every dedup-relevant header always produce the same key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey([u8; 32]);

/// The set of header names whose values participate in a [`RequestKey`].
///
/// Defaults to `accept`, `authorization` and `content-type`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyHeaders {
    // Kept sorted by name so digests don't depend on insertion order.
    names: Vec<HeaderName>,
}

// ===== impl RequestKey =====

impl RequestKey {
    /// Derives the key of `descriptor` using the default [`KeyHeaders`].
    pub fn of(descriptor: &Descriptor) -> Self {
        RequestKey::with_headers(descriptor, &KeyHeaders::default())
    }

    /// Derives the key of `descriptor`, hashing only the values of `headers`.
    pub fn with_headers(descriptor: &Descriptor, headers: &KeyHeaders) -> Self {
        let mut hasher = Sha256::new();

        field(&mut hasher, descriptor.method().as_str().as_bytes());
        field(&mut hasher, normalize_uri(descriptor.uri()).as_bytes());
        field(&mut hasher, descriptor.body());

        for name in &headers.names {
            let values = descriptor.headers().get_all(name);
            // A header that is absent and one that is present but empty must
            // not collide, so record the count before the values.
            let count = values.iter().count() as u64;
            field(&mut hasher, name.as_str().as_bytes());
            hasher.update(count.to_be_bytes());
            for value in values {
                field(&mut hasher, value.as_bytes());
            }
        }

        RequestKey(hasher.finalize().into())
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

fn field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Lowercases scheme and host, drops default ports and gives an empty path
/// its canonical `/`.
fn normalize_uri(uri: &Uri) -> String {
    let mut out = String::new();
    let scheme = uri.scheme_str().map(str::to_ascii_lowercase);

    if let Some(ref scheme) = scheme {
        out.push_str(scheme);
        out.push_str("://");
    }

    if let Some(authority) = uri.authority() {
        out.push_str(&authority.host().to_ascii_lowercase());
        let default_port = match scheme.as_deref() {
            Some("http") | Some("ws") => Some(80),
            Some("https") | Some("wss") => Some(443),
            _ => None,
        };
        if let Some(port) = authority.port_u16() {
            if Some(port) != default_port {
                out.push(':');
                out.push_str(&port.to_string());
            }
        }
    }

    match uri.path() {
        "" => out.push('/'),
        path => out.push_str(path),
    }

    if let Some(query) = uri.query() {
        out.push('?');
        out.push_str(query);
    }

    out
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestKey")
            .field(&format_args!("{}", self))
            .finish()
    }
}

// ===== impl KeyHeaders =====

impl KeyHeaders {
    /// No header participates in the key.
    pub fn none() -> Self {
        KeyHeaders { names: Vec::new() }
    }

    /// Adds `name` to the set.
    pub fn insert(&mut self, name: HeaderName) {
        if let Err(at) = self
            .names
            .binary_search_by(|header| header.as_str().cmp(name.as_str()))
        {
            self.names.insert(at, name);
        }
    }

    /// Removes `name` from the set.
    pub fn remove(&mut self, name: &HeaderName) {
        self.names.retain(|n| n != name);
    }

    /// Whether `name` participates in the key.
    pub fn contains(&self, name: &HeaderName) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Iterates the header names in digest order.
    pub fn iter(&self) -> impl Iterator<Item = &HeaderName> {
        self.names.iter()
    }
}

impl Default for KeyHeaders {
    fn default() -> Self {
        [header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE]
            .iter()
            .cloned()
            .collect()
    }
}

impl std::iter::FromIterator<HeaderName> for KeyHeaders {
    fn from_iter<I: IntoIterator<Item = HeaderName>>(iter: I) -> Self {
        let mut headers = KeyHeaders::none();
        iter.into_iter().for_each(|name| headers.insert(name));
        headers
    }
}
