//! Foldgate orchestrates molecular prediction jobs against an external
//! compute provider.
//!
//! A submission is classified into an individual job or a batch (one
//! parent, one child per ligand), persisted, and dispatched to the
//! provider under bounded concurrency with retry. Completion flows back
//! two ways: HMAC-authenticated webhooks as the fast path, and a polling
//! reconciler as the backstop for lost deliveries. Both apply terminal
//! outcomes through one idempotent lifecycle path, so duplicate and
//! racing deliveries are harmless. Batch parents never run anything
//! themselves; their status is derived from their children.
//!
//! Module map:
//!
//! - [`job`]: core record, id, status, and input types
//! - [`classifier`]: submission validation and individual/batch planning
//! - [`store`]: persistence boundary with optimistic versioning
//! - [`cache`]: TTL read cache with invalidation
//! - [`lifecycle`]: state machine, idempotent transitions, batch aggregation
//! - [`provider`]: compute provider client boundary
//! - [`dispatch`]: bounded-concurrency submission with retry
//! - [`webhook`]: authenticated completion callbacks
//! - [`reconciler`]: polling sweep for lost completions
//! - [`service`]: the facade the HTTP layer drives
//! - [`config`]: runtime settings

pub mod cache;
pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod job;
pub mod lifecycle;
pub mod provider;
pub mod reconciler;
pub mod service;
pub mod store;
pub mod webhook;
