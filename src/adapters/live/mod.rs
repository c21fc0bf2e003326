//! Live adapters for real external interactions.

pub mod repository;

pub use repository::LiveRepository;
