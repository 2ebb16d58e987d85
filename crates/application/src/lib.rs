#![forbid(unsafe_code)]

pub mod activities;
pub mod audit_service_impl;
pub mod audit_workflow;
pub mod durable;
pub mod retry;
pub mod runner;
pub mod scheduler_workflow;
pub mod worker;

#[cfg(test)]
mod test_support;
