#![forbid(unsafe_code)]

pub mod memory;
pub mod notify;
pub mod storage;

mod record;
