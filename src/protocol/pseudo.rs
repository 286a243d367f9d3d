//! Pseudo-type translation.
//!
//! The server encodes values with no JSON primitive (times, binary blobs,
//! grouped aggregations) as tagged objects carrying a `$reql_type$` field.
//! The converter rewrites decoded response documents post-order, replacing
//! tagged objects with native values according to the run options.

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Conversion mode for one pseudo-type family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Translate tagged objects into native values.
    #[default]
    Native,
    /// Leave tagged objects exactly as the server sent them.
    Raw,
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "native" => Ok(Self::Native),
            "raw" => Ok(Self::Raw),
            other => Err(Error::driver(format!("Unknown format: {other}"))),
        }
    }
}

/// Options consumed when running a query.
///
/// The three format knobs drive the pseudo-type converter; `noreply` and `db`
/// travel to the server as global optargs.
#[derive(Debug, Clone, Default)]
pub struct RunOpts {
    pub time_format: Format,
    pub group_format: Format,
    pub binary_format: Format,
    /// When true the server sends no response at all.
    pub noreply: bool,
    /// Per-query database, overriding the connection default.
    pub db: Option<String>,
}

impl RunOpts {
    pub fn with_time_format(mut self, format: Format) -> Self {
        self.time_format = format;
        self
    }

    pub fn with_group_format(mut self, format: Format) -> Self {
        self.group_format = format;
        self
    }

    pub fn with_binary_format(mut self, format: Format) -> Self {
        self.binary_format = format;
        self
    }

    pub fn noreply(mut self) -> Self {
        self.noreply = true;
        self
    }

    pub fn with_db(mut self, db: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self
    }
}

/// One group/reduction pair of a grouped aggregation, in server order.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedItem {
    pub group: Datum,
    pub reduction: Datum,
}

/// A native document value.
///
/// JSON primitives map structurally; the `Time`, `Binary`, and `Grouped`
/// variants are what the tagged pseudo-type encodings convert into.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Datum>),
    Object(BTreeMap<String, Datum>),
    /// A TIME pseudo-type, millisecond precision. The server's timezone
    /// annotation is dropped.
    Time(DateTime<Utc>),
    /// A BINARY pseudo-type, decoded from its base64 transport encoding.
    Binary(Vec<u8>),
    /// A GROUPED_DATA pseudo-type, pair order as the server emitted it.
    Grouped(Vec<GroupedItem>),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Datum]> {
        match self {
            Datum::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Datum>> {
        match self {
            Datum::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Datum::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Datum::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Rewrite a decoded response document into native values.
pub fn convert(value: Value, opts: &RunOpts) -> Result<Datum> {
    match value {
        Value::Array(items) => Ok(Datum::Array(
            items
                .into_iter()
                .map(|item| convert(item, opts))
                .collect::<Result<_>>()?,
        )),
        Value::Object(map) => {
            let tag = map.get(PSEUDO_TYPE_KEY).and_then(Value::as_str);
            match tag {
                Some(PSEUDO_TIME) => convert_time(map, opts),
                Some(PSEUDO_GROUPED_DATA) => convert_grouped(map, opts),
                Some(PSEUDO_BINARY) => convert_binary(map, opts),
                // Unknown tags are returned untouched.
                Some(_) => Ok(embed(Value::Object(map))),
                None => Ok(Datum::Object(
                    map.into_iter()
                        .map(|(key, item)| Ok((key, convert(item, opts)?)))
                        .collect::<Result<_>>()?,
                )),
            }
        }
        leaf => Ok(embed(leaf)),
    }
}

/// Structural embedding with no pseudo-type dispatch, for raw mode and
/// unknown tags.
fn embed(value: Value) -> Datum {
    match value {
        Value::Null => Datum::Null,
        Value::Bool(b) => Datum::Bool(b),
        Value::Number(n) => Datum::Number(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => Datum::String(s),
        Value::Array(items) => Datum::Array(items.into_iter().map(embed).collect()),
        Value::Object(map) => Datum::Object(
            map.into_iter()
                .map(|(key, item)| (key, embed(item)))
                .collect(),
        ),
    }
}

fn convert_time(map: serde_json::Map<String, Value>, opts: &RunOpts) -> Result<Datum> {
    if opts.time_format == Format::Raw {
        return Ok(embed(Value::Object(map)));
    }
    let epoch = map
        .get("epoch_time")
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            Error::driver(format!(
                "pseudo-type TIME object {} missing expected field epoch_time",
                Value::Object(map.clone())
            ))
        })?;
    let millis = (epoch * 1000.0).round() as i64;
    let time = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| Error::driver(format!("epoch_time {epoch} out of range")))?;
    Ok(Datum::Time(time))
}

fn convert_grouped(mut map: serde_json::Map<String, Value>, opts: &RunOpts) -> Result<Datum> {
    if opts.group_format == Format::Raw {
        return Ok(embed(Value::Object(map)));
    }
    let Some(Value::Array(data)) = map.remove("data") else {
        return Err(Error::driver(
            "pseudo-type GROUPED_DATA object missing expected field data",
        ));
    };
    let mut items = Vec::with_capacity(data.len());
    for pair in data {
        let Value::Array(mut pair) = pair else {
            return Err(Error::driver("malformed GROUPED_DATA pair"));
        };
        if pair.len() != 2 {
            return Err(Error::driver("malformed GROUPED_DATA pair"));
        }
        let reduction = pair.pop().unwrap_or(Value::Null);
        let group = pair.pop().unwrap_or(Value::Null);
        items.push(GroupedItem {
            group: convert(group, opts)?,
            reduction: convert(reduction, opts)?,
        });
    }
    Ok(Datum::Grouped(items))
}

fn convert_binary(map: serde_json::Map<String, Value>, opts: &RunOpts) -> Result<Datum> {
    if opts.binary_format == Format::Raw {
        return Ok(embed(Value::Object(map)));
    }
    let data = map.get("data").and_then(Value::as_str).ok_or_else(|| {
        Error::driver("pseudo-type BINARY object missing expected field data")
    })?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| Error::driver(format!("invalid base64 in BINARY pseudo-type: {e}")))?;
    Ok(Datum::Binary(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn time_doc() -> Value {
        json!({"$reql_type$": "TIME", "epoch_time": 1.5, "timezone": "+00:00"})
    }

    #[test]
    fn test_time_native() {
        let datum = convert(time_doc(), &RunOpts::default()).unwrap();
        let time = datum.as_time().unwrap();
        assert_eq!(time.timestamp_millis(), 1500);
    }

    #[test]
    fn test_time_raw_unchanged() {
        let opts = RunOpts::default().with_time_format(Format::Raw);
        let datum = convert(time_doc(), &opts).unwrap();
        let obj = datum.as_object().unwrap();
        assert_eq!(obj.get(PSEUDO_TYPE_KEY).unwrap().as_str(), Some("TIME"));
        assert_eq!(obj.get("epoch_time").unwrap().as_f64(), Some(1.5));
        assert_eq!(obj.get("timezone").unwrap().as_str(), Some("+00:00"));
    }

    #[test]
    fn test_time_missing_epoch() {
        let doc = json!({"$reql_type$": "TIME", "timezone": "+00:00"});
        let err = convert(doc, &RunOpts::default()).unwrap_err();
        assert!(err
            .to_string()
            .contains("missing expected field epoch_time"));
    }

    #[test]
    fn test_time_negative_epoch() {
        let doc = json!({"$reql_type$": "TIME", "epoch_time": -2.5});
        let datum = convert(doc, &RunOpts::default()).unwrap();
        assert_eq!(datum.as_time().unwrap().timestamp_millis(), -2500);
    }

    #[test]
    fn test_grouped_native_preserves_order() {
        let doc = json!({
            "$reql_type$": "GROUPED_DATA",
            "data": [["b", 2], ["a", 1], ["c", 3]]
        });
        let datum = convert(doc, &RunOpts::default()).unwrap();
        let Datum::Grouped(items) = datum else {
            panic!("expected grouped datum");
        };
        let groups: Vec<_> = items
            .iter()
            .map(|item| item.group.as_str().unwrap().to_string())
            .collect();
        assert_eq!(groups, ["b", "a", "c"]);
        assert_eq!(items[0].reduction.as_f64(), Some(2.0));
    }

    #[test]
    fn test_grouped_raw_unchanged() {
        let doc = json!({"$reql_type$": "GROUPED_DATA", "data": [["a", 1]]});
        let opts = RunOpts::default().with_group_format(Format::Raw);
        let datum = convert(doc, &opts).unwrap();
        assert!(datum.as_object().unwrap().contains_key(PSEUDO_TYPE_KEY));
    }

    #[test]
    fn test_grouped_missing_data() {
        let doc = json!({"$reql_type$": "GROUPED_DATA"});
        assert!(convert(doc, &RunOpts::default()).is_err());
    }

    #[test]
    fn test_binary_native() {
        let doc = json!({"$reql_type$": "BINARY", "data": "aGVsbG8="});
        let datum = convert(doc, &RunOpts::default()).unwrap();
        assert_eq!(datum.as_binary().unwrap(), b"hello");
    }

    #[test]
    fn test_binary_missing_data() {
        let doc = json!({"$reql_type$": "BINARY"});
        let err = convert(doc, &RunOpts::default()).unwrap_err();
        assert!(err.to_string().contains("missing expected field data"));
    }

    #[test]
    fn test_binary_invalid_base64() {
        let doc = json!({"$reql_type$": "BINARY", "data": "!!not-base64!!"});
        assert!(convert(doc, &RunOpts::default()).is_err());
    }

    #[test]
    fn test_unknown_tag_untouched() {
        let doc = json!({"$reql_type$": "GEOMETRY", "coordinates": [1, 2]});
        let datum = convert(doc.clone(), &RunOpts::default()).unwrap();
        assert_eq!(datum, embed(doc));
    }

    #[test]
    fn test_nested_conversion() {
        let doc = json!({"times": [time_doc(), time_doc()], "n": 1});
        let datum = convert(doc, &RunOpts::default()).unwrap();
        let times = datum.as_object().unwrap().get("times").unwrap();
        for item in times.as_array().unwrap() {
            assert!(item.as_time().is_some());
        }
    }

    #[test]
    fn test_plain_values_embed_structurally() {
        let doc = json!({"a": [1, "two", null, true]});
        let datum = convert(doc, &RunOpts::default()).unwrap();
        let items = datum.as_object().unwrap().get("a").unwrap();
        let items = items.as_array().unwrap();
        assert_eq!(items[0].as_f64(), Some(1.0));
        assert_eq!(items[1].as_str(), Some("two"));
        assert!(items[2].is_null());
        assert_eq!(items[3].as_bool(), Some(true));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("native".parse::<Format>().unwrap(), Format::Native);
        assert_eq!("raw".parse::<Format>().unwrap(), Format::Raw);
        let err = "bogus".parse::<Format>().unwrap_err();
        assert!(err.to_string().contains("Unknown format: bogus"));
    }
}
