//! Environment variable expansion in the configuration file

#[cfg(test)]
use std::collections::HashMap;
use std::env;
use std::fs;

use serde_json::Value;

use super::ConfigurationError;

/// Expands `${env.NAME}` and `${file.PATH}` in every string of a configuration.
///
/// Variables without one of these prefixes are left as written, so SuiteQL
/// containing `$` survives expansion untouched.
#[derive(Clone, Default)]
pub(crate) struct Expansion {
    #[cfg(test)]
    mocked_env_vars: HashMap<String, String>,
}

impl Expansion {
    #[cfg(test)]
    pub(crate) fn with_mocked_env_vars(mocked_env_vars: HashMap<String, String>) -> Self {
        Self { mocked_env_vars }
    }

    fn context_fn(&self) -> impl Fn(&str) -> Result<Option<String>, ConfigurationError> + '_ {
        move |key: &str| {
            if let Some(name) = key.strip_prefix("env.") {
                return self.get_env(name).map(Some).map_err(|cause| {
                    ConfigurationError::CannotExpandVariable {
                        key: key.to_string(),
                        cause: format!("{cause}"),
                    }
                });
            }
            if let Some(path) = key.strip_prefix("file.") {
                return fs::read_to_string(path).map(Some).map_err(|cause| {
                    ConfigurationError::CannotExpandVariable {
                        key: key.to_string(),
                        cause: format!("{cause}"),
                    }
                });
            }
            Ok(None)
        }
    }

    fn get_env(&self, name: &str) -> Result<String, env::VarError> {
        #[cfg(test)]
        if let Some(value) = self.mocked_env_vars.get(name) {
            return Ok(value.clone());
        }
        env::var(name)
    }

    pub(crate) fn expand(&self, configuration: &Value) -> Result<Value, ConfigurationError> {
        let mut configuration = configuration.clone();
        self.visit(&mut configuration)?;
        Ok(configuration)
    }

    fn visit(&self, value: &mut Value) -> Result<(), ConfigurationError> {
        let mut expanded: Option<String> = None;
        match value {
            Value::String(value) => {
                let new_value =
                    shellexpand::env_with_context(value, self.context_fn()).map_err(|e| e.cause)?;
                if &new_value != value {
                    expanded = Some(new_value.to_string());
                }
            }
            Value::Array(a) => {
                for v in a {
                    self.visit(v)?;
                }
            }
            Value::Object(o) => {
                for v in o.values_mut() {
                    self.visit(v)?;
                }
            }
            _ => {}
        }
        // Expanded values stay strings, a numeric secret must not become a number.
        if let Some(expanded) = expanded {
            *value = Value::String(expanded);
        }
        Ok(())
    }
}
