//! Domain types and DTOs

pub mod analysis;
