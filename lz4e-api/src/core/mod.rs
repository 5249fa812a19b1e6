//! Core types module

pub mod types;
