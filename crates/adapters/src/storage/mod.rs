pub mod redb_cache_store;
pub mod redb_checkpoint_store;
pub mod redb_database;
pub mod redb_document_store;
pub mod redb_vector_index;
