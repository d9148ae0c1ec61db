//! Core trait abstractions for the graph sync library.
//!
//! The pipeline only talks to persistence through [`store::GraphStore`], so
//! the in-memory, SQLite and Neo4j backends are interchangeable.

pub mod store;
