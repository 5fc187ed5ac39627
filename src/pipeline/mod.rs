//! Composable read pipelines over the relational store.
//!
//! A [`Pipeline`] is a declarative sequence of stages: match the primary
//! collection, sort, look up related rows into named JSON fields, compute
//! correlated counts/membership, project, paginate. Stages compile to a
//! single parameterized SQL statement whose rows come back as JSON documents,
//! so every list endpoint shares one execution path and one pagination
//! contract.

mod error;
mod page;
#[allow(clippy::module_inception)]
mod pipeline;

pub use error::PipelineError;
pub use page::{Page, PageParams};
pub use pipeline::{Lookup, ManyLookup, Pipeline, SortDirection, SqlQuery};
