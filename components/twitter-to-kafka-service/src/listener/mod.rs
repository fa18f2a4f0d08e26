pub mod listener;
pub mod models;
pub mod sink;
