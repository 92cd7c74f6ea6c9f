//! Framed packet codec for point-to-point serial links.
//!
//! # Crate Structure
//!
//! - [`frame`]: packet encoding, stream reassembly and typed payloads

/// Re-export frame types.
pub mod frame {
    pub use kserial_frame::*;
}
