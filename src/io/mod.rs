//! Collaborators at the edges of a pipeline: readers and feeders produce items, exporters
//! consume them.
//!
//! Feeders turn malformed records into [`crate::PipelineError::Unparseable`], one per record,
//! so a bad line is counted as a drop and the run goes on.

mod exporters;
mod feeders;
mod reader;

pub use exporters::{CollectExporter, Export, Exporter, JsonLinesExporter};
pub use feeders::{ChannelFeeder, CsvFeeder, JsonFeeder, JsonLinesFeeder, ListFeeder};
pub use reader::{FileReader, RawStream, Reader};
