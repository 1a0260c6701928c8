//! `item-pipeline` runs import jobs as trees of small item transformations.
//!
//! Records ("items") come from a producer, flow one at a time through an ordered list of steps,
//! and end up in exporters. Along the way processors fill defaults, assign values, map values or
//! keys, pick or omit fields, and drop items that should not be imported.
//!
//! The crate is built from three layers:
//!
//! - [`path`]: symbolic field paths (`users[0].address.city`) resolved against nested records,
//!   with best-effort writes that silently skip unreachable parents;
//! - [`processor`] and [`dispatch`]: processors declare handlers per value shape, and each
//!   selected field is routed to the most specific one;
//! - [`pipeline`]: a depth-first executor with fan-out branches, per-branch contexts, drop
//!   recovery, metrics and an idle-polling mode.
//!
//! ## Example
//!
//! ```rust
//! use item_pipeline::expression::field;
//! use item_pipeline::io::{CollectExporter, ListFeeder};
//! use item_pipeline::pipeline::{Pipeline, Step};
//! use item_pipeline::processor::{Assigner, Dropper, Mapper, Selector};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), item_pipeline::PipelineError> {
//! let feeder = ListFeeder::from_values(vec![
//!     json!({"symbol": "BHP", "industry": "Materials"}),
//!     json!({"symbol": "XYZ", "industry": "Not Applic"}),
//! ])?;
//! let sink = CollectExporter::new();
//!
//! let pipeline = Pipeline::new(vec![
//!     Step::action(feeder),
//!     Step::action(Dropper::new(
//!         Selector::item(),
//!         field("industry").is_in(vec!["Not Applic", "Class Pend"]),
//!     )),
//!     Step::action(Assigner::new(field("exchange"), "ASX")),
//!     Step::action(Mapper::keys(Selector::item(), json!({"symbol": "code"}))?),
//!     Step::export(sink.clone()),
//! ]);
//!
//! let summary = pipeline.run()?;
//! assert_eq!((summary.processed, summary.dropped), (1, 1));
//! assert_eq!(
//!     sink.items()[0].clone().into_value(),
//!     json!({"code": "BHP", "industry": "Materials", "exchange": "ASX"})
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`]: [`types::Item`], [`types::Shape`] and the per-branch [`types::Context`]
//! - [`expression`]: deferred field references and predicates
//! - [`importer`]: named pipelines with methods referenced by name
//! - [`io`]: file readers, feeders and exporters
//! - [`error`]: the error type shared by every layer
//! - [`logging`]: `tracing` subscriber setup for binaries

pub mod dispatch;
pub mod error;
pub mod expression;
pub mod importer;
pub mod io;
pub mod logging;
pub mod path;
pub mod pipeline;
pub mod processor;
pub mod types;

pub use error::{PipelineError, PipelineResult};
