//! Face embedding, content-addressed caching and identity clustering for
//! large collections of video frames.

pub mod cache;
pub mod clustering;
pub mod detection;
pub mod embedding;
pub mod pipeline;
pub mod query;
pub mod shared;
