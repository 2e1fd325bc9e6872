//! Shared test utilities for the orchestrator workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`handlers`]: spy, slow, failing and panicking tool handlers
//! - [`providers`]: scripted fakes for the browser, runner, tracker and chat
//!   providers
//! - [`karate`]: [`KarateProject`] builder for on-disk feature and report fixtures

pub mod handlers;
pub mod karate;
pub mod providers;

pub use handlers::{FailingHandler, PanickingHandler, SlowHandler, SpyHandler};
pub use karate::KarateProject;
pub use providers::{FakeBrowser, FakeChat, FakeRunner, FakeTracker};
