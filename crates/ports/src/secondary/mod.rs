pub mod cache_store;
pub mod checkpoint_store;
pub mod document_store;
pub mod metrics_port;
pub mod notification_sink;
pub mod store_accessor;
pub mod vector_index;
