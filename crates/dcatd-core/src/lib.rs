//! # dcatd-core
//!
//! Core types, traits, and protocols for the dcatd metadata catalog.
//!
//! This crate provides the document model, the backend contracts that
//! storage, search and metadata-profile plugins implement, the hook
//! registry that dispatches to them, and the optimistic concurrency
//! protocol that turns conditional HTTP requests into backend calls.

pub mod controller;
pub mod dcat;
pub mod error;
pub mod etag;
pub mod filter;
pub mod hooks;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod precondition;
pub mod traits;

// Re-export commonly used types at crate root
pub use controller::{
    resolve_delete_intent, resolve_put_intent, ConcurrencyController, Outcome, WriteIntent,
};
pub use dcat::DcatApProfile;
pub use error::{Error, Result};
pub use etag::{compute_etag, ETag, ETagSet};
pub use filter::{Comparator, FieldFilter, FieldPath, PathSegment, SearchQuery};
pub use hooks::{HookName, HookRegistry, HookRegistryBuilder, ResultPolicy};
pub use models::*;
pub use pipeline::{CanonicalizationPipeline, PreparedDocument};
pub use precondition::Precondition;
pub use traits::*;
