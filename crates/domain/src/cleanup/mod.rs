pub mod entity;
pub mod safety;
