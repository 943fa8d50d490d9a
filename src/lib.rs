//! # Reload Controller Library
//!
//! Core of a Kubernetes controller that watches ConfigMaps and Secrets
//! and performs rolling restarts of the workloads that consume them when
//! their content changes.
//!
//! The pipeline: a watch event passes the predicate layer ([`filter`]),
//! the reconciler ([`controller::source`]) lists workloads through the
//! registry ([`workload::registry`]), the pure [`matcher`] produces
//! reload decisions, and the retry driver ([`executor`]) applies the
//! selected [`strategy`] with optimistic-concurrency retries, honoring
//! the pause scheduler ([`controller::pause`]). Content fingerprints come
//! from [`hash`]; everything observable lands in
//! [`observability::metrics`], cluster events, and the optional
//! webhook/alert sinks ([`notify`]).

pub mod cli;
pub mod config;
pub mod constants;
pub mod controller;
pub mod executor;
pub mod filter;
pub mod hash;
pub mod leader;
pub mod matcher;
pub mod notify;
pub mod observability;
pub mod pause;
pub mod ratelimit;
pub mod selector;
pub mod server;
pub mod strategy;
pub mod workload;
