pub mod cache_defect;
pub mod cache_index;
