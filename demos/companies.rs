//! Import the ASX listed companies fixture.
//!
//! ```bash
//! RUST_LOG=item_pipeline=info cargo run --example companies -- tests/fixtures/companies.csv
//! ```
//!
//! Listed companies are printed as JSON lines on stdout; companies without an industry are
//! dropped and show up in the log.

use std::io::{self, Write};
use std::sync::Arc;

use item_pipeline::expression::field;
use item_pipeline::importer::{Importer, Methods};
use item_pipeline::io::{CsvFeeder, FileReader, JsonLinesExporter};
use item_pipeline::logging;
use item_pipeline::pipeline::{Emit, PipelineOptions, Step, TracingObserver};
use item_pipeline::processor::{Assigner, Dropper, Logger, Mapper, Picker, Selector};
use item_pipeline::PipelineResult;
use serde_json::json;

fn main() -> PipelineResult<()> {
    logging::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/fixtures/companies.csv".to_string());
    let options = match std::env::var("PIPELINE_OPTIONS") {
        Ok(raw) => PipelineOptions::from_json_str(&raw)?,
        Err(_) => PipelineOptions::default(),
    };

    let source = json!(path);
    let methods = Methods::new()
        .with_value("source_file", move |_, _| Ok(source.clone()))
        .with_action("upper_name", |mut item, _| {
            if let Some(name) = item.get("name").and_then(|v| v.as_str()).map(str::to_uppercase) {
                item.insert("name", name);
            }
            Ok(Emit::One(item))
        });

    let importer = Importer::new(
        "asx_companies",
        vec![
            Step::action(CsvFeeder::new(FileReader::new(&path), ["name", "code", "industry"]).skip(1)),
            Step::action(Dropper::new(
                Selector::item(),
                field("industry").is_in(vec!["Not Applic", "Class Pend"]),
            )),
            Step::action(Assigner::new(field("exchange"), "ASX")),
            Step::action(Assigner::method(field("source"), "source_file").cached()),
            Step::method("upper_name"),
            Step::action(Mapper::keys(Selector::item(), json!({"code": "symbol"}))?),
            Step::branch([
                Step::action(Picker::new([field("symbol"), field("industry")])),
                Step::action(Logger::new().label("industry")),
            ]),
            Step::export(JsonLinesExporter::new(io::stdout())),
        ],
    )
    .methods(methods)
    .options(options)
    .observer(Arc::new(TracingObserver));

    let summary = importer.run()?;
    io::stdout().flush()?;
    eprintln!("{summary}");
    Ok(())
}
