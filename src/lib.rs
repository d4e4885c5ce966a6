//! # Subscription Merge Library
//!
//! This library provides the core functionality for synthesizing a single
//! Clash/mihomo engine configuration from remote proxy subscriptions and
//! operator-maintained documents. It is designed to be used by the
//! `subforge` command-line tool but can also be embedded by applications
//! that drive merge runs themselves.
//!
//! ## Core Concepts
//!
//! - **Subscriptions (`subscription`, `fetch`)**: Operator-configured
//!   remote node sources with per-source prefixing and name filters.
//! - **Document Model (`document`)**: Thin helpers over `serde_yaml`
//!   values; every stage passes the same mapping-rooted document along.
//! - **Merge Layers (`template`, `policy`, `overlay`, `sandbox`)**: The
//!   ordered composition layers: base template, site policy, static
//!   override, and the Node.js transform script sandbox.
//! - **Final Sanitation (`dedup`, `groups`, `rules`, `runtime`)**: Node
//!   deduplication, group membership sanitation, rule ordering and
//!   filtering, and deployment-owned runtime settings.
//! - **Orchestration (`pipeline`, `persist`)**: The fixed stage order,
//!   run-level mutual exclusion, backups, and the atomic config write.
//!
//! ## Execution Flow
//!
//! The main entry point is [`pipeline::MergeRunner`], which executes the
//! stages in a fixed order: fetch, dedup, template composition, site
//! policy, override merge, script transform, runtime normalization,
//! group sanitation, rule filtering, and finally backup-then-persist.
//! Per-subscription failures are recorded in the [`pipeline::RunReport`]
//! and never abort a run; contract violations in the transform sandbox
//! do, before anything replaces the previous config.

pub mod dedup;
pub mod document;
pub mod error;
pub mod fetch;
pub mod groups;
pub mod overlay;
pub mod persist;
pub mod pipeline;
pub mod policy;
pub mod rules;
pub mod runtime;
pub mod sandbox;
pub mod settings;
pub mod subscription;
pub mod template;

mod merge_proptest;

pub use error::{Error, Result};
