// src/lib.rs — Library root for tipstream

pub mod cli;
pub mod core;
pub mod infra;
pub mod integrations;
pub mod memory;
pub mod provider;
pub mod streams;
pub mod util;
