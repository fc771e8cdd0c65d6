//! Dify backend protocol: event types, stream demultiplexing, and the
//! outbound HTTP client.

pub mod client;
pub mod event;
