// src/ingest/providers/mod.rs
//! Per-kind request building and decoding. Transport lives in `ingest::client`.

pub mod newsapi;
pub mod reddit;
pub mod rss;
