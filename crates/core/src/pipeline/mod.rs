pub mod batch_driver;
pub mod batch_executor;
pub mod batch_logger;
pub mod infrastructure;
