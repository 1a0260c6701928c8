use std::sync::OnceLock;

use serde_json::{Map, Value};
use tracing::debug;

use crate::dispatch::{cached, FieldCall, FieldOutcome, Registry, RegistryCell};
use crate::error::{PipelineError, PipelineResult};
use crate::types::{Context, Item, Shape};

use super::{dispatch, Handlers, Processor, Selector};

fn absent_or_unparseable(call: &FieldCall<'_>, format: &str) -> PipelineResult<FieldOutcome> {
    if !call.exists {
        debug!(field = %call.field, "nothing to load; field is absent");
        return Ok(FieldOutcome::Keep);
    }
    Err(PipelineError::unparseable(format!(
        "could not load {format} from field '{}': expected a string, got {}",
        call.field,
        Shape::of(&call.value)
    )))
}

/// Parses string fields holding JSON documents.
#[derive(Debug, Clone)]
pub struct JsonLoader {
    selector: Selector,
}

impl JsonLoader {
    pub fn new(selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
        }
    }

    fn load_string(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        let Value::String(raw) = &call.value else {
            return Ok(FieldOutcome::Keep);
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(parsed) => Ok(FieldOutcome::Value(parsed)),
            Err(e) => Err(PipelineError::unparseable(format!(
                "could not load JSON from field '{}': {e}",
                call.field
            ))),
        }
    }

    fn reject(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        absent_or_unparseable(&call, "JSON")
    }
}

impl Processor for JsonLoader {
    fn name(&self) -> &str {
        "json_loader"
    }

    fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        dispatch(self, item, ctx)
    }
}

impl Handlers for JsonLoader {
    fn registry() -> PipelineResult<&'static Registry<Self>> {
        static REGISTRY: RegistryCell<JsonLoader> = OnceLock::new();
        cached(&REGISTRY, || {
            Registry::builder()
                .field("load_string", &[Shape::String], Self::load_string)
                .any_field("reject", Self::reject)
                .build()
        })
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}

/// Parses string fields holding one CSV record.
///
/// Without columns the field becomes a list of strings. With columns it becomes a dict; a
/// `None` column discards that position, and a record whose length differs from the column
/// list is unparseable.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    selector: Selector,
    columns: Option<Vec<Option<String>>>,
    delimiter: u8,
    quote: u8,
}

impl CsvLoader {
    pub fn new(selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
            columns: None,
            delimiter: b',',
            quote: b'"',
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(|c| c.map(Into::into)).collect());
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

    fn load_string(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        let Value::String(raw) = &call.value else {
            return Ok(FieldOutcome::Keep);
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .from_reader(raw.as_bytes());

        let record = match reader.records().next() {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                return Err(PipelineError::unparseable(format!(
                    "could not load CSV from field '{}': {e}",
                    call.field
                )));
            }
            None => {
                return Err(PipelineError::unparseable(format!(
                    "field '{}' holds no CSV record",
                    call.field
                )));
            }
        };

        Ok(FieldOutcome::Value(record_to_value(
            &record,
            self.columns.as_deref(),
        )?))
    }

    fn reject(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        absent_or_unparseable(&call, "CSV")
    }
}

/// Convert one CSV record into a list, or into a dict keyed by `columns`.
pub(crate) fn record_to_value(
    record: &csv::StringRecord,
    columns: Option<&[Option<String>]>,
) -> PipelineResult<Value> {
    let Some(columns) = columns else {
        return Ok(Value::Array(record.iter().map(Value::from).collect()));
    };
    if columns.len() != record.len() {
        return Err(PipelineError::unparseable(format!(
            "CSV record has {} values but {} columns are configured",
            record.len(),
            columns.len()
        )));
    }
    let mut out = Map::with_capacity(columns.len());
    for (column, raw) in columns.iter().zip(record.iter()) {
        if let Some(name) = column {
            out.insert(name.clone(), Value::from(raw));
        }
    }
    Ok(Value::Object(out))
}

impl Processor for CsvLoader {
    fn name(&self) -> &str {
        "csv_loader"
    }

    fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        dispatch(self, item, ctx)
    }
}

impl Handlers for CsvLoader {
    fn registry() -> PipelineResult<&'static Registry<Self>> {
        static REGISTRY: RegistryCell<CsvLoader> = OnceLock::new();
        cached(&REGISTRY, || {
            Registry::builder()
                .field("load_string", &[Shape::String], Self::load_string)
                .any_field("reject", Self::reject)
                .build()
        })
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}

#[cfg(test)]
mod tests {
    use super::{CsvLoader, JsonLoader};
    use crate::error::PipelineError;
    use crate::expression::field;
    use crate::processor::Processor;
    use crate::types::{Context, Item};
    use serde_json::{json, Value};

    fn run(p: &dyn Processor, value: Value) -> Result<Value, PipelineError> {
        p.invoke(Item::from_value(value).unwrap(), &mut Context::new())
            .map(Item::into_value)
    }

    #[test]
    fn json_strings_are_parsed_in_place() {
        let p = JsonLoader::new(field("raw"));
        let out = run(&p, json!({"raw": "{\"name\": \"Jeff\", \"age\": 34}"})).unwrap();
        assert_eq!(out, json!({"raw": {"name": "Jeff", "age": 34}}));

        let out = run(&p, json!({"raw": "[1, 2]"})).unwrap();
        assert_eq!(out["raw"], json!([1, 2]));
    }

    #[test]
    fn malformed_json_is_unparseable() {
        let p = JsonLoader::new(field("raw"));
        let err = run(&p, json!({"raw": "{nope"})).unwrap_err();
        assert!(matches!(err, PipelineError::Unparseable { .. }));
        assert!(err.is_drop());

        let err = run(&p, json!({"raw": 12})).unwrap_err();
        assert!(err.to_string().contains("expected a string, got number"));

        assert_eq!(run(&p, json!({})).unwrap(), json!({}));
    }

    #[test]
    fn csv_records_become_lists_or_dicts() {
        let plain = CsvLoader::new(field("line"));
        assert_eq!(run(&plain, json!({"line": "Jeff,34"})).unwrap()["line"], json!(["Jeff", "34"]));

        let named = CsvLoader::new(field("line")).columns([Some("name"), Some("age")]);
        assert_eq!(
            run(&named, json!({"line": "Jeff,34"})).unwrap()["line"],
            json!({"name": "Jeff", "age": "34"})
        );

        let excluded = CsvLoader::new(field("line")).columns([Some("name"), None]);
        assert_eq!(
            run(&excluded, json!({"line": "Jeff,34"})).unwrap()["line"],
            json!({"name": "Jeff"})
        );
    }

    #[test]
    fn csv_honours_delimiter_and_quote() {
        let p = CsvLoader::new(field("line")).delimiter(b'|').quote(b'\'');
        assert_eq!(
            run(&p, json!({"line": "'Smith|Jones'|42"})).unwrap()["line"],
            json!(["Smith|Jones", "42"])
        );
    }

    #[test]
    fn csv_column_count_mismatch_is_unparseable() {
        let p = CsvLoader::new(field("line")).columns([Some("name"), Some("age")]);
        let err = run(&p, json!({"line": "Jeff,34,extra"})).unwrap_err();
        assert!(matches!(err, PipelineError::Unparseable { .. }));
    }
}
