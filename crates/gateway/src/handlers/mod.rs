//! API handlers module

pub mod grade;
pub mod health;
