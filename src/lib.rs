//! Casper DEX client core and its HTTP adapter

pub mod api;
pub mod chain;
pub mod config;
pub mod types;
