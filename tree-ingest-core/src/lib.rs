#![doc = "tree-ingest-core: core logic library for tree-ingest."]

//! This crate contains the traversal, scheduling and upsert logic that sits between a
//! read-only item API and a document store. Concrete HTTP sources and storage backends
//! live in the `tree-ingest` binary crate; this crate only sees them through the
//! [`contract::ItemSource`] and [`contract::Store`] traits.
//!
//! # Usage
//! Build a [`pipeline::Pipeline`] from an item source, a store and a
//! [`config::PipelineConfig`], then call [`pipeline::Pipeline::run`].

pub mod config;
pub mod contract;
pub mod error;
pub mod fetcher;
pub mod memory;
pub mod pipeline;
pub mod scheduler;
pub mod upsert;
