//! Namespace Replicator Library
//!
//! This library provides the core functionality for the Namespace Replicator,
//! a controller that copies annotated ConfigMaps and Secrets into other
//! namespaces and keeps the copies in sync with their source.
//!
//! ## Quick Start
//!
//! ```rust
//! use namespace_replicator::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod observability;
pub mod prelude;
pub mod runtime;
