//! Implementations of the repository port.

pub mod live;
pub mod recording;
pub mod replaying;
