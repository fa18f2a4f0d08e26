pub mod errors;
pub mod load_config;
pub mod shutdown;
