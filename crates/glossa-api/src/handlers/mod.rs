//! Route handlers.

pub mod admin;
pub mod items;
