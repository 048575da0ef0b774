//! # Core Module
//!
//! Fundamental concurrency primitives used throughout the chunk pipeline.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking.
//!   Chunks travel through the pipeline inside an `MtResource` so that fan-in
//!   stages can read several chunks at once, and the provider's cache is shared
//!   with the pipeline coordinator the same way.

pub mod mt_resource;

pub use mt_resource::MtResource;
