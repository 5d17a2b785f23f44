//! Shared reading of the JSON-array sources.

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use sprout_core::tag::{Formdata, Offset};

use crate::{Error, Result, record::OffsetSpec, time};

/// Read `path` as a top-level JSON array.
pub(crate) fn read_array(path: &Path) -> Result<Vec<Value>> {
  let text =
    std::fs::read_to_string(path).map_err(|e| Error::from_read(path, e))?;
  match serde_json::from_str::<Value>(&text) {
    Ok(Value::Array(items)) => Ok(items),
    Ok(other) => Err(Error::Unreadable {
      path:   path.to_owned(),
      reason: format!("expected a JSON array, found {}", kind_of(&other)),
    }),
    Err(e) => {
      Err(Error::Unreadable { path: path.to_owned(), reason: e.to_string() })
    }
  }
}

/// Deserialize one array element, describing the failure for the report.
pub(crate) fn entry<T: DeserializeOwned>(value: Value) -> Result<T, String> {
  serde_json::from_value(value).map_err(|e| e.to_string())
}

fn kind_of(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

/// Convert recorded formdata. Strings are kept, `null` becomes `""`, numbers
/// and booleans are rendered; nested values make the entry malformed.
pub(crate) fn formdata(raw: BTreeMap<String, Value>) -> Result<Formdata, String> {
  raw
    .into_iter()
    .map(|(field, value)| {
      let text = match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => {
          return Err(format!("field {field:?} holds {}", kind_of(&nested)));
        }
      };
      Ok((field, text))
    })
    .collect()
}

/// The `label_template` object stored alongside a label.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawTemplate {
  #[serde(default)]
  pub label:   Option<String>,
  #[serde(default)]
  pub offsets: Option<Offset>,
}

/// An explicit adjustment wins; otherwise the template offsets are legacy
/// values with the nudge baked in.
pub(crate) fn offset_spec(
  adjustment: Option<Offset>,
  template: Option<&RawTemplate>,
) -> OffsetSpec {
  let base = template.and_then(|t| t.offsets);
  match (adjustment, base) {
    (Some(adjustment), base) => OffsetSpec::Explicit { adjustment, base },
    (None, Some(template_offsets)) => OffsetSpec::Legacy { template_offsets },
    (None, None) => OffsetSpec::Absent,
  }
}

/// A timestamp recorded as Unix seconds (integer or fractional).
pub(crate) fn unix_time(v: &Value) -> Option<DateTime<Utc>> {
  match v {
    Value::Number(n) => n
      .as_i64()
      .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
      .and_then(time::from_unix),
    Value::String(s) => s.trim().parse().ok().and_then(time::from_unix),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn non_array_and_garbage_are_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let obj = dir.path().join("obj.json");
    std::fs::write(&obj, r#"{"a":1}"#).unwrap();
    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, "[{").unwrap();

    assert!(matches!(read_array(&obj), Err(Error::Unreadable { .. })));
    assert!(matches!(read_array(&bad), Err(Error::Unreadable { .. })));
    assert!(matches!(
      read_array(&dir.path().join("none.json")),
      Err(Error::Missing(_))
    ));
  }

  #[test]
  fn formdata_renders_scalars_and_rejects_nesting() {
    let raw: BTreeMap<String, Value> =
      serde_json::from_value(json!({"a": "x", "b": null, "c": 3, "d": true}))
        .unwrap();
    let fd = formdata(raw).unwrap();
    assert_eq!(fd.get("b"), Some(""));
    assert_eq!(fd.get("c"), Some("3"));
    assert_eq!(fd.get("d"), Some("true"));

    let nested: BTreeMap<String, Value> =
      serde_json::from_value(json!({"a": ["x"]})).unwrap();
    assert!(formdata(nested).is_err());
  }

  #[test]
  fn offset_spec_prefers_explicit_adjustment() {
    let template =
      RawTemplate { label: None, offsets: Some(Offset::new(55, -22)) };
    assert_eq!(
      offset_spec(Some(Offset::new(5, -2)), Some(&template)),
      OffsetSpec::Explicit {
        adjustment: Offset::new(5, -2),
        base:       Some(Offset::new(55, -22)),
      }
    );
    assert_eq!(
      offset_spec(None, Some(&template)),
      OffsetSpec::Legacy { template_offsets: Offset::new(55, -22) }
    );
    assert_eq!(offset_spec(None, None), OffsetSpec::Absent);
  }

  #[test]
  fn unix_time_accepts_numbers_and_numeric_strings() {
    let expected = time::from_unix(1_709_979_072);
    assert_eq!(unix_time(&json!(1_709_979_072)), expected);
    assert_eq!(unix_time(&json!(1_709_979_072.6)), expected);
    assert_eq!(unix_time(&json!("1709979072")), expected);
    assert_eq!(unix_time(&json!(null)), None);
  }
}
