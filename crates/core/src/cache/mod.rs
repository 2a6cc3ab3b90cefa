pub mod content_hash;
pub mod domain;
pub mod error;
pub mod infrastructure;
