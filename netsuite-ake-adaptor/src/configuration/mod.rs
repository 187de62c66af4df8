//! Logic for loading configuration in to an object model

mod expansion;

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use derivative::Derivative;
use displaydoc::Display;
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use self::expansion::Expansion;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not read configuration file '{path}': {error}
    CannotReadFile {
        path: String,
        error: std::io::Error,
    },
    /// could not expand variable: {key}, {cause}
    CannotExpandVariable { key: String, cause: String },
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

/// The configuration for the adaptor.
///
/// Can be created through `serde::Deserialize` from various formats, or with
/// [`Configuration::new`] and the `with_*` methods.
#[derive(Clone, Derivative, Deserialize, JsonSchema)]
#[derivative(Debug)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// The AWS region hosting the remote functions.
    /// When unset the region is resolved from the environment.
    #[serde(default)]
    pub region_name: Option<String>,

    /// Access key id of explicit credentials.
    /// Explicit credentials are only used when `region_name`, `access_key_id` and
    /// `secret_access_key` are all set, otherwise the default credentials chain is used.
    #[serde(default, alias = "aws_access_key_id")]
    pub access_key_id: Option<String>,

    /// Secret access key of explicit credentials.
    #[serde(default, alias = "aws_secret_access_key")]
    #[derivative(Debug = "ignore")]
    pub secret_access_key: Option<String>,

    /// Identifies the remote GraphQL endpoint.
    pub endpoint_id: String,

    /// The data views that can be fetched by name.
    #[serde(default)]
    pub data_views: Vec<DataViewDefinition>,

    /// Overrides the url of the Lambda service, e.g. to reach a local emulator.
    /// Defaults to `https://lambda.<region>.amazonaws.com/`.
    #[serde(default)]
    pub lambda_endpoint_url: Option<Url>,
}

/// A named SuiteQL query that can be fetched by name, filtered and paginated.
///
/// Besides `{name, base_query}` (or `{data_view_name, suiteql}`), a view may
/// nest its query as `{data_view_name, configuration: {suiteql}}`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DataViewDefinition {
    /// The name the view is requested by.
    #[serde(alias = "data_view_name")]
    pub name: String,

    /// The SuiteQL query backing the view. It is embedded as a sub-query when
    /// filters are applied, so it must be a complete `SELECT` statement.
    #[serde(alias = "suiteql")]
    pub base_query: String,
}

impl DataViewDefinition {
    pub fn new(name: impl Into<String>, base_query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_query: base_query.into(),
        }
    }
}

impl<'de> Deserialize<'de> for DataViewDefinition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawDataView::deserialize(deserializer)? {
            RawDataView::Flat(FlatDataView { name, base_query }) => Self { name, base_query },
            RawDataView::Nested(NestedDataView {
                data_view_name,
                configuration,
            }) => Self {
                name: data_view_name,
                base_query: configuration.suiteql,
            },
        })
    }
}

#[derive(Deserialize)]
#[serde(
    untagged,
    expecting = "a data view with `name` and `base_query`, or `data_view_name` and `configuration.suiteql`"
)]
enum RawDataView {
    Flat(FlatDataView),
    Nested(NestedDataView),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FlatDataView {
    #[serde(alias = "data_view_name")]
    name: String,
    #[serde(alias = "suiteql")]
    base_query: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NestedDataView {
    #[serde(alias = "name")]
    data_view_name: String,
    configuration: NestedQuery,
}

/// Other keys of the nested `configuration` are ignored.
#[derive(Deserialize)]
struct NestedQuery {
    suiteql: String,
}

/// Region and keys of explicit credentials.
#[derive(Clone, Copy)]
pub(crate) struct ExplicitCredentials<'a> {
    pub(crate) region_name: &'a str,
    pub(crate) access_key_id: &'a str,
    pub(crate) secret_access_key: &'a str,
}

impl Configuration {
    pub fn new(endpoint_id: impl Into<String>) -> Self {
        Self {
            region_name: None,
            access_key_id: None,
            secret_access_key: None,
            endpoint_id: endpoint_id.into(),
            data_views: Vec::new(),
            lambda_endpoint_url: None,
        }
    }

    pub fn with_region_name(mut self, region_name: impl Into<String>) -> Self {
        self.region_name = Some(region_name.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_data_view(mut self, data_view: DataViewDefinition) -> Self {
        self.data_views.push(data_view);
        self
    }

    pub fn with_lambda_endpoint_url(mut self, url: Url) -> Self {
        self.lambda_endpoint_url = Some(url);
        self
    }

    /// Load and validate the configuration file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|error| {
            tracing::error!(path = %path.display(), %error, "could not read configuration file");
            ConfigurationError::CannotReadFile {
                path: path.display().to_string(),
                error,
            }
        })?;
        raw.parse()
    }

    /// Explicit credentials, when all of their parts are configured.
    pub(crate) fn explicit_credentials(&self) -> Option<ExplicitCredentials<'_>> {
        match (
            non_empty(&self.region_name),
            non_empty(&self.access_key_id),
            non_empty(&self.secret_access_key),
        ) {
            (Some(region_name), Some(access_key_id), Some(secret_access_key)) => {
                Some(ExplicitCredentials {
                    region_name,
                    access_key_id,
                    secret_access_key,
                })
            }
            _ => None,
        }
    }

    /// Whether credentials were configured only partially.
    pub(crate) fn has_partial_credentials(&self) -> bool {
        self.explicit_credentials().is_none()
            && (non_empty(&self.access_key_id).is_some()
                || non_empty(&self.secret_access_key).is_some())
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        if self.endpoint_id.trim().is_empty() {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "endpoint_id is required",
                error: "endpoint_id must not be empty".to_string(),
            });
        }

        for data_view in &self.data_views {
            if data_view.name.trim().is_empty() {
                return Err(ConfigurationError::InvalidConfiguration {
                    message: "invalid data view",
                    error: "data view names must not be empty".to_string(),
                });
            }
            if data_view.base_query.trim().is_empty() {
                return Err(ConfigurationError::InvalidConfiguration {
                    message: "invalid data view",
                    error: format!("data view '{}' has an empty base_query", data_view.name),
                });
            }
        }
        Ok(())
    }

    /// Names defined by more than one data view, once each.
    pub(crate) fn duplicate_data_views(&self) -> Vec<&str> {
        let mut names = HashSet::new();
        let mut duplicates = Vec::new();
        for data_view in &self.data_views {
            let name = data_view.name.as_str();
            if !names.insert(name) && !duplicates.contains(&name) {
                duplicates.push(name);
            }
        }
        duplicates
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(raw_yaml: &str) -> Result<Self, Self::Err> {
        let configuration = parse_configuration(raw_yaml).map_err(|err| {
            tracing::error!(error = %err, "invalid configuration");
            err
        })?;
        for name in configuration.duplicate_data_views() {
            tracing::warn!(
                data_view = name,
                "data view is defined more than once, only the first definition is used"
            );
        }
        Ok(configuration)
    }
}

fn parse_configuration(raw_yaml: &str) -> Result<Configuration, ConfigurationError> {
    let yaml = serde_yaml::from_str::<serde_json::Value>(raw_yaml).map_err(|e| {
        ConfigurationError::InvalidConfiguration {
            message: "failed to parse yaml",
            error: e.to_string(),
        }
    })?;
    let expanded = Expansion::default().expand(&yaml)?;
    let configuration: Configuration = serde_json::from_value(expanded).map_err(|e| {
        ConfigurationError::InvalidConfiguration {
            message: "failed to deserialize configuration",
            error: e.to_string(),
        }
    })?;
    configuration.validate()?;
    Ok(configuration)
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> RootSchema {
    schemars::schema_for!(Configuration)
}
