//! Testing infrastructure for reportkit tests.
//!
//! - `fixtures`: demo schemas and seeded backends
//! - `world`: isolated data directory and config for CLI tests

pub mod fixtures;
pub mod world;

pub use fixtures::DemoSchemas;
pub use world::TestWorld;
