//! Reviewing-side live sync: the debounced poll loop and its
//! change-suppression cache.

pub mod cache;
pub mod client;

pub use cache::FingerprintCache;
pub use client::LiveSyncClient;
