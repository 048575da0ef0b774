//! # Voxel Pipeline Demo Entry Point
//!
//! Runs the library's demo: a small region of generated chunks pushed through
//! the full processing pipeline to readiness.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release
//! ```

fn main() {
    voxel_pipeline::run();
}
