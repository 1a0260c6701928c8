//! Producer actions: each ignores its input item and emits a lazy stream of new items.

use std::fs::File;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{Action, Emit};
use crate::processor::record_to_value;
use crate::types::{Context, Item};

use super::reader::{FileReader, Reader};

fn into_item(value: Value, source: &str) -> PipelineResult<Item> {
    match value {
        Value::Object(map) => Ok(Item::from(map)),
        other => Err(PipelineError::unparseable(format!(
            "{source} record is not an object: {other}"
        ))),
    }
}

/// Emits a fixed list of items.
#[derive(Debug, Clone, Default)]
pub struct ListFeeder {
    items: Vec<Item>,
}

impl ListFeeder {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// Build from JSON values; every value must be an object.
    pub fn from_values(values: Vec<Value>) -> PipelineResult<Self> {
        let items = values
            .into_iter()
            .map(|v| {
                Item::from_value(v).ok_or_else(|| PipelineError::config("list feeder values must be objects"))
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(Self { items })
    }
}

impl Action for ListFeeder {
    fn name(&self) -> &str {
        "list_feeder"
    }

    fn call(&self, _item: Item, _ctx: &mut Context) -> PipelineResult<Emit<'_>> {
        Ok(Emit::items(self.items.iter().cloned()))
    }
}

/// Emits the objects of JSON documents: an array yields one item per element, an object yields
/// itself.
pub struct JsonFeeder {
    reader: Box<dyn Reader>,
}

impl JsonFeeder {
    pub fn new(reader: impl Reader + 'static) -> Self {
        Self {
            reader: Box::new(reader),
        }
    }

    /// Whole-file JSON documents under `path`.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(FileReader::new(path).lines(false))
    }
}

fn parse_document(raw: PipelineResult<String>) -> Vec<PipelineResult<Option<Item>>> {
    let raw = match raw {
        Ok(raw) => raw,
        Err(e) => return vec![Err(e)],
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(values)) => values
            .into_iter()
            .map(|v| into_item(v, "JSON").map(Some))
            .collect(),
        Ok(Value::Object(map)) => vec![Ok(Some(Item::from(map)))],
        Ok(other) => vec![Err(PipelineError::unparseable(format!(
            "JSON document holds neither a list nor an object: {other}"
        )))],
        Err(e) => vec![Err(PipelineError::unparseable(format!("could not load JSON document: {e}")))],
    }
}

impl Action for JsonFeeder {
    fn name(&self) -> &str {
        "json_feeder"
    }

    fn call(&self, _item: Item, _ctx: &mut Context) -> PipelineResult<Emit<'_>> {
        let documents = self.reader.read()?;
        Ok(Emit::stream(documents.flat_map(parse_document)))
    }
}

/// Emits one item per line of newline-delimited JSON.
pub struct JsonLinesFeeder {
    reader: Box<dyn Reader>,
}

impl JsonLinesFeeder {
    pub fn new(reader: impl Reader + 'static) -> Self {
        Self {
            reader: Box::new(reader),
        }
    }

    pub fn from_path(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(FileReader::new(path))
    }
}

fn parse_line(raw: PipelineResult<String>) -> PipelineResult<Option<Item>> {
    let line = raw?;
    match serde_json::from_str::<Value>(&line) {
        Ok(value) => into_item(value, "JSON lines").map(Some),
        Err(e) => Err(PipelineError::unparseable(format!("could not load JSON line {line:?}: {e}"))),
    }
}

impl Action for JsonLinesFeeder {
    fn name(&self) -> &str {
        "json_lines_feeder"
    }

    fn call(&self, _item: Item, _ctx: &mut Context) -> PipelineResult<Emit<'_>> {
        Ok(Emit::stream(self.reader.read()?.map(parse_line)))
    }
}

/// Emits one item per CSV record.
///
/// Records are keyed by the configured columns, or by the first record after `skip` when
/// [`CsvFeeder::with_headers`] is used. A record whose length does not match is unparseable.
#[derive(Debug, Clone)]
pub struct CsvFeeder {
    files: FileReader,
    columns: Option<Vec<Option<String>>>,
    skip: usize,
    delimiter: u8,
    quote: u8,
}

impl CsvFeeder {
    pub fn new<I, S>(files: FileReader, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files,
            columns: Some(columns.into_iter().map(|c| Some(c.into())).collect()),
            skip: 0,
            delimiter: b',',
            quote: b'"',
        }
    }

    /// Take column names from each file's first record.
    pub fn with_headers(files: FileReader) -> Self {
        Self {
            files,
            columns: None,
            skip: 0,
            delimiter: b',',
            quote: b'"',
        }
    }

    /// Ignore the first `skip` records of each file.
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    fn open(&self, path: &std::path::Path) -> PipelineResult<csv::Reader<File>> {
        Ok(csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .from_path(path)?)
    }

    fn records(&self, reader: csv::Reader<File>) -> impl Iterator<Item = PipelineResult<Option<Item>>> + '_ {
        let mut columns = self.columns.clone();
        reader
            .into_records()
            .skip(self.skip)
            .filter_map(move |record| {
                let record = match record {
                    Ok(record) => record,
                    Err(e) if e.is_io_error() => return Some(Err(PipelineError::Csv(e))),
                    Err(e) => return Some(Err(PipelineError::unparseable(format!("malformed CSV record: {e}")))),
                };
                if columns.is_none() {
                    columns = Some(record.iter().map(|h| Some(h.to_owned())).collect());
                    return None;
                }
                Some(
                    record_to_value(&record, columns.as_deref())
                        .and_then(|v| into_item(v, "CSV"))
                        .map(Some),
                )
            })
    }
}

impl Action for CsvFeeder {
    fn name(&self) -> &str {
        "csv_feeder"
    }

    fn call(&self, _item: Item, _ctx: &mut Context) -> PipelineResult<Emit<'_>> {
        let paths = self.files.paths()?;
        Ok(Emit::stream(paths.into_iter().flat_map(move |path| {
            debug!(path = %path.display(), "reading CSV file");
            let stream: Box<dyn Iterator<Item = PipelineResult<Option<Item>>> + '_> = match self.open(&path) {
                Ok(reader) => Box::new(self.records(reader)),
                Err(e) => Box::new(std::iter::once(Err(e))),
            };
            stream
        })))
    }
}

/// Drains whatever is queued on a channel, then ends the run.
///
/// Combined with polling mode (`close_when_idle = false`) the pipeline sleeps and drains again,
/// which makes this the feeder for unbounded queue sources.
#[derive(Debug)]
pub struct ChannelFeeder {
    rx: Mutex<Receiver<Value>>,
}

impl ChannelFeeder {
    pub fn new(rx: Receiver<Value>) -> Self {
        Self { rx: Mutex::new(rx) }
    }
}

impl Action for ChannelFeeder {
    fn name(&self) -> &str {
        "channel_feeder"
    }

    fn call(&self, _item: Item, _ctx: &mut Context) -> PipelineResult<Emit<'_>> {
        Ok(Emit::stream(std::iter::from_fn(move || {
            let rx = match self.rx.lock() {
                Ok(rx) => rx,
                Err(_) => return Some(Err(PipelineError::config("channel feeder lock poisoned"))),
            };
            match rx.try_recv() {
                Ok(value) => Some(into_item(value, "queued").map(Some)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::sync::mpsc;

    fn drain(action: &dyn Action) -> Vec<PipelineResult<Option<Item>>> {
        match action.call(Item::new(), &mut Context::new()).unwrap() {
            Emit::Stream(stream) => stream.collect(),
            other => panic!("expected a stream, got {other:?}"),
        }
    }

    fn items(results: Vec<PipelineResult<Option<Item>>>) -> Vec<Value> {
        results
            .into_iter()
            .map(|r| r.unwrap().unwrap().into_value())
            .collect()
    }

    #[test]
    fn list_feeder_emits_items_in_order() {
        let data = vec![
            json!({"name": "Jeff Winger", "age": 32}),
            json!({"name": "Annie Edison", "age": 24}),
        ];
        let feeder = ListFeeder::from_values(data.clone()).unwrap();
        assert_eq!(items(drain(&feeder)), data);
        assert!(ListFeeder::from_values(vec![json!(1)]).is_err());
    }

    #[test]
    fn json_feeder_accepts_arrays_and_objects() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.json");
        let single = dir.path().join("single.json");
        fs::write(&list, r#"[{"a": 1}, {"a": 2}, 3]"#).unwrap();
        fs::write(&single, r#"{"a": 3}"#).unwrap();

        let out = drain(&JsonFeeder::from_path(&list));
        assert_eq!(out.len(), 3);
        assert!(out[2].as_ref().unwrap_err().is_drop());

        assert_eq!(items(drain(&JsonFeeder::from_path(&single))), vec![json!({"a": 3})]);
    }

    #[test]
    fn json_lines_feeder_flags_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.ndjson");
        fs::write(&path, "{\"a\": 1}\n\nnot json\n{\"a\": 2}\n").unwrap();
        let out = drain(&JsonLinesFeeder::from_path(&path));
        assert_eq!(out.len(), 3);
        assert!(matches!(out[1], Err(PipelineError::Unparseable { .. })));
        assert_eq!(out[2].as_ref().unwrap().as_ref().unwrap().get("a"), Some(&json!(2)));
    }

    #[test]
    fn csv_feeder_uses_columns_or_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        fs::write(&path, "name,age\nJeff Winger,32\nAnnie Edison,24\nbroken\n").unwrap();

        let by_columns = CsvFeeder::new(FileReader::new(&path), ["name", "age"]).skip(1);
        let out = drain(&by_columns);
        assert_eq!(out.len(), 3);
        assert_eq!(
            out[0].as_ref().unwrap().clone().unwrap().into_value(),
            json!({"name": "Jeff Winger", "age": "32"})
        );
        assert!(out[2].as_ref().unwrap_err().is_drop());

        let by_headers = CsvFeeder::with_headers(FileReader::new(&path));
        let out = drain(&by_headers);
        assert_eq!(
            out[1].as_ref().unwrap().clone().unwrap().into_value(),
            json!({"name": "Annie Edison", "age": "24"})
        );
    }

    #[test]
    fn channel_feeder_drains_what_is_queued() {
        let (tx, rx) = mpsc::channel();
        let feeder = ChannelFeeder::new(rx);
        tx.send(json!({"n": 1})).unwrap();
        tx.send(json!({"n": 2})).unwrap();
        assert_eq!(items(drain(&feeder)), vec![json!({"n": 1}), json!({"n": 2})]);
        assert!(drain(&feeder).is_empty());

        tx.send(json!({"n": 3})).unwrap();
        assert_eq!(items(drain(&feeder)), vec![json!({"n": 3})]);
    }
}
