//! Recording adapters that capture interactions to transcripts.

pub mod repository;

pub use repository::RecordingRepository;
