//! Core types for the literature review pipeline
//!
//! This crate provides the foundational types used across all other crates:
//! - Chunks produced by document segmentation
//! - Retrieval candidates flowing through gathering and reranking
//! - The umbrella error type

pub mod chunk;
pub mod error;

pub use chunk::{metadata_keys, Candidate, CandidateSource, Chunk, Metadata};
pub use error::{Error, Result};
