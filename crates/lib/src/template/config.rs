//! Starter configuration file for the bundled application.

use serde_yaml::{Mapping, Value};

use crate::manifest::ConfigKeys;

/// Endpoint placeholder. The `.invalid` TLD never resolves, so an unedited
/// template cannot reach a live service.
pub const PLACEHOLDER_API_BASE: &str = "http://your-api-server.invalid:8000/v1";
pub const PLACEHOLDER_API_KEY: &str = "your-api-key";
pub const PLACEHOLDER_MODEL: &str = "openai/your-model-name";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

const HEADER: &str = "\
# Offline configuration template.
# Replace every placeholder below with the values for your API server,
# then save this file under the name the application expects.
";

/// Render the configuration template as YAML.
///
/// Keys with an empty configured name are left out.
pub fn render(keys: &ConfigKeys) -> Result<String, serde_yaml::Error> {
  let mut mapping = Mapping::new();
  let mut set = |key: &str, value: Value| {
    if !key.is_empty() {
      mapping.insert(Value::String(key.to_string()), value);
    }
  };

  set(&keys.api_base, Value::String(PLACEHOLDER_API_BASE.to_string()));
  set(&keys.api_key, Value::String(PLACEHOLDER_API_KEY.to_string()));
  set(&keys.model, Value::String(PLACEHOLDER_MODEL.to_string()));
  set(&keys.timeout, Value::Number(DEFAULT_TIMEOUT_SECS.into()));
  set(&keys.proxy, Value::Null);

  let body = serde_yaml::to_string(&mapping)?;
  Ok(format!("{}{}", HEADER, body))
}
