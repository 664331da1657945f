// src/integrations/mod.rs — Delivery integrations

pub mod telegram;
pub mod types;

pub use types::{MessagingAdapter, RecordingAdapter};
