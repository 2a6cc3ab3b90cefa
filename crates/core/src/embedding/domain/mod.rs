pub mod face_embedding;
