#![doc = "repovault-core: core backup pipeline library for repovault."]

//! This crate contains all business logic for organization-wide git backups:
//! project/repository discovery, per-repository clone-and-archive, manifest
//! accumulation, multi-destination upload dispatch and the run orchestrator.
//! Concrete collaborator clients (provider HTTP API, object stores, SMTP) are
//! not included here; they live in the CLI crate and plug in through the
//! traits in [`contract`].
//!
//! # Usage
//! Add this as a dependency for all shared pipeline, discovery, archive,
//! manifest and orchestration code.

pub mod archive;
pub mod context;
pub mod contract;
pub mod discover;
pub mod manifest;
pub mod notify;
pub mod run;
pub mod upload;
