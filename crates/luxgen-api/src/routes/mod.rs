//! API Routes

pub mod executions;
pub mod health;
pub mod tenant;
pub mod workflows;
