//! # git-promotion
//!
//! Promotes configuration files from one deployment stage to the next by
//! opening a pull request against a hosted git repository.
//!
//! ## Overview
//!
//! - [`replacer`] rewrites values tagged with inline markers.
//! - [`repoaccess`] abstracts the hosting API behind [`repoaccess::RepositoryClient`].
//! - [`promotion`] drives a branch, syncs the mapped paths and opens the pull request.
//! - [`config`] and [`event`] load the promotion configuration and trigger event.
//!
//! ## Quick Start
//!
//! ```rust
//! use git_promotion::event::FieldMap;
//! use git_promotion::replacer::ContentReplacer;
//!
//! let fields: FieldMap = [("data.image".to_string(), "app:2.0".to_string())]
//!     .into_iter()
//!     .collect();
//! let replacer = ContentReplacer::default();
//! let out = replacer.replace(
//!     "image: app:1.0 # {\"keptn.git-promotion.replacewith\":\"data.image\"}",
//!     &fields,
//! );
//! assert!(out.starts_with("image: app:2.0 "));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod event;
pub mod promotion;
pub mod replacer;
pub mod repoaccess;
pub mod utils;

pub use crate::cli::Cli;
pub use crate::promotion::{Promoter, PromotionError, PromotionOutcome};

/// The current version of git-promotion.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
