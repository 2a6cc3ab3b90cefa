pub mod cluster_engine;
pub mod domain;
