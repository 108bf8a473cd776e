//! Shared test utilities for umaten integration tests.
//!
//! This module provides:
//! - Fake collaborators with scripted outcomes and call tracking
//! - Builders for configs, category trees and batch requests
//! - `TestHarness` wiring an orchestrator to the fakes

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::TestHarness;
