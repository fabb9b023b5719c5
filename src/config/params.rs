use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// Runtime values substituted into `${name}` placeholders.
#[derive(Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    /// Create empty params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter value.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Set a parameter value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Get a parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse from CLI args like "key=value".
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut params = Self::new();
        for arg in args {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                Error::Config(format!("invalid param '{}', expected key=value", arg))
            })?;
            params.values.insert(key.to_string(), value.to_string());
        }
        Ok(params)
    }
}

// Values include credentials; only the keys are printed.
impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        f.debug_struct("Params").field("keys", &keys).finish()
    }
}

/// Parameter definition in a workflow config.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamDef {
    #[serde(default)]
    pub required: bool,

    /// Used when the run does not supply a value.
    pub default: Option<String>,

    pub description: Option<String>,
}

/// Substitute `${var}` patterns in a string.
///
/// Names that are neither supplied nor defined are left as-is.
pub fn substitute(
    template: &str,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(var_start) = result[start..].find("${") {
        let var_start = start + var_start;
        let Some(var_end) = result[var_start..].find('}') else {
            break;
        };
        let var_end = var_start + var_end;

        let var_name = &result[var_start + 2..var_end];

        let value = if let Some(v) = params.get(var_name) {
            v.to_string()
        } else if let Some(def) = defs.get(var_name) {
            if let Some(ref default) = def.default {
                default.clone()
            } else if def.required {
                return Err(Error::Config(format!(
                    "missing required parameter: {}",
                    var_name
                )));
            } else {
                String::new()
            }
        } else {
            start = var_end + 1;
            continue;
        };

        result.replace_range(var_start..=var_end, &value);
        start = var_start + value.len();
    }

    Ok(result)
}

/// Recursively substitute params in a serde_yaml::Value.
pub fn substitute_value(
    value: &mut serde_yaml::Value,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) => {
            *s = substitute(s, params, defs)?;
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(required: bool, default: Option<&str>) -> ParamDef {
        ParamDef {
            required,
            default: default.map(String::from),
            description: None,
        }
    }

    #[test]
    fn test_substitute_period() {
        let params = Params::new().set("period", "2025/05");
        let result = substitute("Período: ${period}", &params, &HashMap::new()).unwrap();
        assert_eq!(result, "Período: 2025/05");
    }

    #[test]
    fn test_substitute_multiple() {
        let params = Params::new().set("period_month", "05").set("period_year", "2025");
        let result = substitute(
            "Mes ${period_month}, Año ${period_year}",
            &params,
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(result, "Mes 05, Año 2025");
    }

    #[test]
    fn test_substitute_default_amount() {
        let mut defs = HashMap::new();
        defs.insert("amount".to_string(), def(false, Some("1000.00")));
        let result = substitute("base ${amount}", &Params::new(), &defs).unwrap();
        assert_eq!(result, "base 1000.00");
    }

    #[test]
    fn test_substitute_required_missing() {
        let mut defs = HashMap::new();
        defs.insert("username".to_string(), def(true, None));
        let result = substitute("${username}", &Params::new(), &defs);
        assert!(result.unwrap_err().to_string().contains("username"));
    }

    #[test]
    fn test_substitute_unknown_left_alone() {
        let result = substitute("${later}", &Params::new(), &HashMap::new()).unwrap();
        assert_eq!(result, "${later}");
    }

    #[test]
    fn test_params_from_args() {
        let args = vec!["amount=1500.00".to_string(), "username=u1".to_string()];
        let params = Params::from_args(&args).unwrap();
        assert_eq!(params.get("amount"), Some("1500.00"));
        assert_eq!(params.get("username"), Some("u1"));
        assert!(Params::from_args(&["oops".to_string()]).is_err());
    }

    #[test]
    fn test_debug_hides_values() {
        let params = Params::new().set("password", "hunter2");
        let printed = format!("{:?}", params);
        assert!(printed.contains("password"));
        assert!(!printed.contains("hunter2"));
    }
}
