//! Domain layer containing business entities and logic.
//!
//! Defines the mapping entity, the repository and unit-of-work contracts, and
//! the background click accounting, independent of any concrete store.
//!
//! # Architecture
//!
//! - [`entities`] - Core business data structures
//! - [`repositories`] - Data access trait definitions
//! - [`click_event`] - Click tracking event model
//! - [`click_worker`] - Asynchronous click processing worker
//!
//! # Click Processing Flow
//!
//! 1. A resolve served from cache sends a [`click_event::ClickEvent`] to a bounded channel
//! 2. [`click_worker::run_click_worker`] processes events with retry logic
//! 3. Each increment runs in its own [`repositories::UnitOfWork`] scope
//!
//! Resolves that miss the cache increment inline and never touch the queue.

pub mod click_event;
pub mod click_worker;
pub mod entities;
pub mod repositories;
