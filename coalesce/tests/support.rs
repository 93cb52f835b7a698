#![allow(dead_code)]

use bytes::Bytes;
use coalesce::Descriptor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) fn trace_init() -> tracing::subscriber::DefaultGuard {
    let subscriber = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_default(subscriber)
}

pub(crate) fn get(uri: &str) -> Descriptor {
    Descriptor::get(uri.parse().unwrap())
}

pub(crate) fn post(uri: &str, body: &'static str) -> Descriptor {
    Descriptor::post(uri.parse().unwrap(), Bytes::from_static(body.as_bytes()))
}

/// Counts how many times a hook ran.
#[derive(Clone, Debug, Default)]
pub(crate) struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub(crate) fn new() -> Self {
        Counter::default()
    }

    pub(crate) fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
