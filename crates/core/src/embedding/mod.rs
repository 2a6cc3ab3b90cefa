pub mod domain;
pub mod embedding_generator;
pub mod preprocess;
