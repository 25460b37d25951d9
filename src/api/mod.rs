//! The public HTTPWrapper API: build a [`Client`] around a transport, then
//! dispatch requests through it.

mod client;

pub use client::*;
