//! Common test utilities
#![allow(unused_imports, dead_code)] // Not every test file uses every helper

pub mod harness;
pub mod stores;

pub use harness::{within, TestHarness};
pub use stores::{FlakyStore, GatedStore};
