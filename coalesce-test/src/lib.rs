#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![forbid(unsafe_code)]
#![allow(elided_lifetimes_in_paths)]

//! Mock transport for testing code built on a `coalesce` client.

mod macros;
pub mod mock;
