pub mod comparison_service;
