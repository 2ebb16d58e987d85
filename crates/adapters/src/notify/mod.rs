pub mod log_sink;
pub mod webhook_sink;
