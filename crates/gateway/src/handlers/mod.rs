//! API handlers module

pub mod data;
pub mod health;
pub mod policy;
