//! Genome pipeline worker service.
//!
//! A worker process runs one job: a list of once-per-run modules and a list of per-genome
//! modules. It registers itself in the metadata DB, runs the once modules on the
//! pipeline-global target, then repeatedly claims the lowest-id unfinished genome, runs the
//! per-genome modules on it in order, and releases it, until no work is left. Workers
//! never talk to each other; the genome owner column is the only coordination.

pub mod config;
pub mod info;
pub mod job;
pub mod service;
