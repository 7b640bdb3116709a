//! Integration test utilities for the chat client
//!
//! This crate provides a scripted stand-in for the platform's gateway
//! and helpers for driving a shard fleet against it.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
