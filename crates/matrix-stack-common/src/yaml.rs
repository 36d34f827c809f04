//! YAML loading for `helm template` output
//!
//! Documents are parsed with yaml-rust2 and converted to `serde_json::Value`
//! so that typed deserialization goes through a single serde path.

use serde_json::{Map, Number, Value};
use tracing::debug;
use yaml_rust2::{Yaml, YamlLoader};

use crate::{Error, Result};

/// Parse every document of a `---`-separated YAML stream.
///
/// Empty documents (helm emits them for templates that render nothing) are
/// dropped, so callers only see real resources.
pub fn parse_documents(input: &str) -> Result<Vec<Value>> {
    let docs = load(input)?;
    let total = docs.len();
    let values = docs
        .into_iter()
        .enumerate()
        .map(|(index, doc)| {
            yaml_to_json(doc).map_err(|e| {
                Error::serialization(format!("document {index}: {e}"))
            })
        })
        .filter(|v| !matches!(v, Ok(Value::Null)))
        .collect::<Result<Vec<_>>>()?;
    debug!(documents = total, kept = values.len(), "parsed YAML stream");
    Ok(values)
}

fn load(input: &str) -> Result<Vec<Yaml>> {
    YamlLoader::load_from_str(input).map_err(|e| Error::serialization(e.to_string()))
}

/// Convert a yaml_rust2::Yaml value to serde_json::Value
fn yaml_to_json(yaml: Yaml) -> Result<Value> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|e: std::num::ParseFloatError| Error::serialization(e.to_string()))?;
            Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(arr) => arr
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Yaml::Hash(map) => map
            .into_iter()
            .map(|(k, v)| {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Real(r) => r,
                    Yaml::Boolean(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => return Err(Error::serialization("unsupported YAML key type")),
                };
                yaml_to_json(v).map(|v| (key, v))
            })
            .collect::<Result<Map<String, Value>>>()
            .map(Value::Object),
        Yaml::Alias(_) => Err(Error::serialization("YAML aliases not supported")),
        Yaml::BadValue => Err(Error::serialization("bad YAML value")),
    }
}
