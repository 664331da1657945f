// src/memory/mod.rs — Embeddings, vector index and the tip log

pub mod embeddings;
pub mod index;
pub mod persistence;
pub mod schema;
pub mod store;
