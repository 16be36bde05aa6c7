//! Foundational low-level utilities shared across opsctx crates.
//!
//! Provides the injectable clock used for time-window filtering and the
//! atomic file-write helper used when exporting snapshots.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{
    current_unix_timestamp, is_within_window, window_start, Clock, FixedClock, SystemClock,
};
