#![forbid(unsafe_code)]

pub mod cleanup;
pub mod common;
pub mod detection;
pub mod inventory;
pub mod report;
pub mod workflow;
