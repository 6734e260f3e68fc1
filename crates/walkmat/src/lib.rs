//! Serial capture, framing and multi-board merging for pressure-sensor
//! walkways.
//!
//! walkmat reads the raw byte streams of one to three 32×32 pressure boards,
//! recovers frames delimited by the `AA 55 03 99` header, reorders each
//! board block into physical layout and merges the boards into one matrix
//! per synchronized round.
//!
//! # Crate Structure
//!
//! - [`transport`] — Link abstraction (serial ports, replayed captures, in-memory links)
//! - [`frame`] — Header-delimited frame recovery
//! - [`matrix`] — JQ transform, resizing, matrices and statistics
//! - [`session`] — Multi-port sessions and the synchronizer (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use walkmat_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use walkmat_frame::*;
}

/// Re-export matrix types.
pub mod matrix {
    pub use walkmat_matrix::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use walkmat_session::*;
}
