//! Invokes functions through the AWS Lambda Invoke API.

use std::fmt;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sigv4::http_request::SignableBody;
use aws_sigv4::http_request::SignableRequest;
use aws_sigv4::http_request::SigningParams;
use aws_sigv4::http_request::SigningSettings;
use aws_sigv4::http_request::sign;
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use aws_types::SdkConfig;
use aws_types::region::Region;
use derivative::Derivative;
use serde_json::Value;
use url::Url;

use super::InvokeError;
use super::RemoteInvoker;
use crate::configuration::Configuration;
use crate::configuration::ConfigurationError;
use crate::configuration::ExplicitCredentials;
use crate::error::AdaptorError;

const SERVICE_NAME: &str = "lambda";
const API_VERSION: &str = "2015-03-31";
const CREDENTIALS_PROVIDER_NAME: &str = "netsuite-ake-adaptor";

const CONTENT_TYPE_HEADER: &str = "content-type";
const INVOCATION_TYPE_HEADER: &str = "x-amz-invocation-type";
const FUNCTION_ERROR_HEADER: &str = "x-amz-function-error";

/// Invokes functions synchronously over HTTPS, signing every call with SigV4.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct LambdaInvoker {
    http_client: reqwest::Client,
    endpoint: Url,
    region: Region,
    #[derivative(Debug = "ignore")]
    credentials_provider: SharedCredentialsProvider,
}

impl LambdaInvoker {
    /// Resolve credentials and region from `configuration`.
    ///
    /// Explicit credentials are used when the region and both keys are
    /// configured, the default AWS credentials chain otherwise. Credentials are
    /// resolved once here.
    pub async fn new(configuration: &Configuration) -> Result<Self, AdaptorError> {
        let (region, credentials_provider) = match credentials_source(configuration) {
            CredentialsSource::Explicit(explicit) => {
                tracing::debug!(region = explicit.region_name, "using explicit AWS credentials");
                let credentials = Credentials::new(
                    explicit.access_key_id,
                    explicit.secret_access_key,
                    None,
                    None,
                    CREDENTIALS_PROVIDER_NAME,
                );
                (
                    Region::new(explicit.region_name.to_owned()),
                    SharedCredentialsProvider::new(credentials),
                )
            }
            CredentialsSource::DefaultChain { region_name } => default_chain(region_name).await?,
        };
        check_credentials(&credentials_provider).await?;

        let endpoint = match &configuration.lambda_endpoint_url {
            Some(url) => url.clone(),
            None => default_endpoint(&region)?,
        };
        if endpoint.cannot_be_a_base() {
            tracing::error!(%endpoint, "invalid lambda endpoint url");
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid lambda_endpoint_url",
                error: format!("'{endpoint}' cannot be used as a base url"),
            }
            .into());
        }

        Ok(Self {
            http_client: reqwest::Client::new(),
            endpoint,
            region,
            credentials_provider,
        })
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    fn invocation_url(&self, function_name: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend([API_VERSION, "functions", function_name, "invocations"]);
        }
        url
    }

    /// Returns the headers carrying the signature of the request.
    fn sign(
        &self,
        credentials: Credentials,
        url: &Url,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Vec<(String, String)>, InvokeError> {
        let identity: Identity = credentials.into();
        let signing_params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(self.region.as_ref())
            .name(SERVICE_NAME)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(signing_error)?
            .into();
        let signable_request = SignableRequest::new(
            "POST",
            url.as_str(),
            headers.iter().copied(),
            SignableBody::Bytes(body),
        )
        .map_err(signing_error)?;
        let (instructions, _signature) = sign(signable_request, &signing_params)
            .map_err(signing_error)?
            .into_parts();
        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect())
    }
}

#[async_trait]
impl RemoteInvoker for LambdaInvoker {
    async fn invoke(&self, function_name: &str, payload: Value) -> Result<Value, InvokeError> {
        let url = self.invocation_url(function_name);
        let body = serde_json::to_vec(&payload).map_err(|err| InvokeError::Payload {
            reason: err.to_string(),
        })?;
        let credentials = self
            .credentials_provider
            .provide_credentials()
            .await
            .map_err(|err| {
                tracing::error!(function_name, error = %err, "could not resolve AWS credentials");
                signing_error(err)
            })?;

        let headers = [
            (CONTENT_TYPE_HEADER, "application/json"),
            (INVOCATION_TYPE_HEADER, "RequestResponse"),
        ];
        let signature = self.sign(credentials, &url, &headers, &body)?;

        tracing::debug!(function_name, %url, "invoking function");
        let mut request = self.http_client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        for (name, value) in signature {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|err| {
            tracing::error!(function_name, error = %err, "could not reach the function service");
            InvokeError::Transport {
                reason: err.to_string(),
            }
        })?;
        let status = response.status();
        let function_error = response
            .headers()
            .get(FUNCTION_ERROR_HEADER)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
        let bytes = response.bytes().await.map_err(|err| {
            tracing::error!(function_name, error = %err, "could not read the function response");
            InvokeError::Transport {
                reason: err.to_string(),
            }
        })?;

        if !status.is_success() {
            let message = rejection_message(&bytes);
            tracing::error!(
                function_name,
                status = status.as_u16(),
                rejection = %message,
                "function call rejected"
            );
            return Err(InvokeError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        if let Some(kind) = function_error {
            let payload = String::from_utf8_lossy(&bytes).into_owned();
            tracing::error!(function_name, %kind, %payload, "function failed");
            return Err(InvokeError::FunctionError { kind, payload });
        }

        serde_json::from_slice(&bytes).map_err(|err| {
            tracing::error!(function_name, error = %err, "function returned an invalid payload");
            InvokeError::Payload {
                reason: err.to_string(),
            }
        })
    }
}

/// Where the credentials of the invoker come from.
enum CredentialsSource<'a> {
    Explicit(ExplicitCredentials<'a>),
    DefaultChain { region_name: Option<&'a str> },
}

fn credentials_source(configuration: &Configuration) -> CredentialsSource<'_> {
    if let Some(explicit) = configuration.explicit_credentials() {
        return CredentialsSource::Explicit(explicit);
    }
    if configuration.has_partial_credentials() {
        tracing::warn!(
            "region_name, access_key_id and secret_access_key must all be set to use explicit credentials, using the default credentials chain"
        );
    }
    CredentialsSource::DefaultChain {
        region_name: configuration
            .region_name
            .as_deref()
            .filter(|name| !name.trim().is_empty()),
    }
}

async fn default_chain(
    region_name: Option<&str>,
) -> Result<(Region, SharedCredentialsProvider), AdaptorError> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region_name) = region_name {
        loader = loader.region(Region::new(region_name.to_owned()));
    }
    resolve_sdk_config(&loader.load().await)
}

fn resolve_sdk_config(
    sdk_config: &SdkConfig,
) -> Result<(Region, SharedCredentialsProvider), AdaptorError> {
    let region = sdk_config.region().cloned().ok_or_else(|| {
        tracing::error!("no AWS region configured");
        AdaptorError::Credentials {
            reason: "no region is configured, set region_name or AWS_REGION".to_owned(),
        }
    })?;
    let credentials_provider = sdk_config.credentials_provider().ok_or_else(|| {
        tracing::error!("no AWS credentials provider available");
        AdaptorError::Credentials {
            reason: "the default credentials chain is unavailable".to_owned(),
        }
    })?;
    Ok((region, credentials_provider))
}

/// Resolve credentials once so that a broken chain is reported before the first call.
async fn check_credentials(
    credentials_provider: &SharedCredentialsProvider,
) -> Result<(), AdaptorError> {
    credentials_provider
        .provide_credentials()
        .await
        .map(|_| ())
        .map_err(|err| {
            tracing::error!(error = %err, "could not resolve AWS credentials");
            AdaptorError::Credentials {
                reason: err.to_string(),
            }
        })
}

fn default_endpoint(region: &Region) -> Result<Url, ConfigurationError> {
    Url::parse(&format!("https://lambda.{region}.amazonaws.com/")).map_err(|err| {
        ConfigurationError::InvalidConfiguration {
            message: "invalid region_name",
            error: err.to_string(),
        }
    })
}

/// The service reports rejections as `{"message": ...}` or `{"Message": ...}`.
fn rejection_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("Message"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

fn signing_error(err: impl fmt::Display) -> InvokeError {
    InvokeError::Signing {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use aws_credential_types::provider::error::CredentialsError;
    use aws_credential_types::provider::future;
    use serde_json::json;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::body_json;
    use wiremock::matchers::header;
    use wiremock::matchers::header_exists;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    use super::*;

    const INVOCATIONS_PATH: &str = "/2015-03-31/functions/netsuite_graphql/invocations";

    fn configuration(endpoint: &str) -> Configuration {
        Configuration::new("ake")
            .with_region_name("us-east-1")
            .with_credentials("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY")
            .with_lambda_endpoint_url(Url::parse(endpoint).unwrap())
    }

    async fn invoker(server: &MockServer) -> LambdaInvoker {
        LambdaInvoker::new(&configuration(&server.uri()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_invoke() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INVOCATIONS_PATH))
            .and(header("x-amz-invocation-type", "RequestResponse"))
            .and(header("content-type", "application/json"))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .and(body_json(json!({ "endpoint_id": "ake" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "ping": "pong" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let response = invoker(&server)
            .await
            .invoke("netsuite_graphql", json!({ "endpoint_id": "ake" }))
            .await
            .unwrap();
        assert_eq!(response, json!({ "data": { "ping": "pong" } }));
    }

    #[tokio::test]
    async fn test_signature_names_the_service_and_region() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        invoker(&server)
            .await
            .invoke("netsuite_graphql", json!({}))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let authorization = requests[0]
            .headers
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(authorization.contains("/us-east-1/lambda/aws4_request"));
        assert!(authorization.contains("x-amz-invocation-type"));
    }

    #[tokio::test]
    async fn test_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(
                json!({ "message": "The security token included in the request is invalid." }),
            ))
            .mount(&server)
            .await;

        let error = invoker(&server)
            .await
            .invoke("netsuite_graphql", json!({}))
            .await
            .unwrap_err();
        assert_eq!(
            error,
            InvokeError::Rejected {
                status: 403,
                message: "The security token included in the request is invalid.".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn test_function_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Amz-Function-Error", "Unhandled")
                    .set_body_json(json!({ "errorMessage": "boom" })),
            )
            .mount(&server)
            .await;

        let error = invoker(&server)
            .await
            .invoke("netsuite_graphql", json!({}))
            .await
            .unwrap_err();
        match error {
            InvokeError::FunctionError { kind, payload } => {
                assert_eq!(kind, "Unhandled");
                assert!(payload.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let error = invoker(&server)
            .await
            .invoke("netsuite_graphql", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(error, InvokeError::Payload { .. }));
    }

    #[tokio::test]
    async fn test_transport_error() {
        let server = MockServer::start().await;
        let invoker = invoker(&server).await;
        drop(server);

        let error = invoker
            .invoke("netsuite_graphql", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(error, InvokeError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_invocation_url() {
        let invoker = LambdaInvoker::new(&configuration("http://localhost:9001/lambda/"))
            .await
            .unwrap();
        assert_eq!(
            invoker.invocation_url("netsuite_graphql").as_str(),
            "http://localhost:9001/lambda/2015-03-31/functions/netsuite_graphql/invocations"
        );
        assert_eq!(invoker.region().as_ref(), "us-east-1");
    }

    #[tokio::test]
    async fn test_endpoint_must_be_a_base() {
        let error = LambdaInvoker::new(&configuration("mailto:lambda@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(error, AdaptorError::Configuration(_)));
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(
            default_endpoint(&Region::new("eu-west-1")).unwrap().as_str(),
            "https://lambda.eu-west-1.amazonaws.com/"
        );
    }

    #[test]
    fn test_rejection_message() {
        assert_eq!(
            rejection_message(br#"{"Type":"User","Message":"Function not found"}"#),
            "Function not found"
        );
        assert_eq!(rejection_message(b"Bad Gateway"), "Bad Gateway");
    }

    #[derive(Debug)]
    struct NoCredentials;

    impl ProvideCredentials for NoCredentials {
        fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
        where
            Self: 'a,
        {
            future::ProvideCredentials::ready(Err(CredentialsError::not_loaded(
                "no credentials in the environment",
            )))
        }
    }

    fn explicit_credentials() -> SharedCredentialsProvider {
        SharedCredentialsProvider::new(Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
            None,
            None,
            CREDENTIALS_PROVIDER_NAME,
        ))
    }

    #[test]
    fn test_partial_credentials_use_the_default_chain() {
        let partial = Configuration::new("ake")
            .with_region_name("eu-west-1")
            .with_credentials("AKIDEXAMPLE", "");
        assert!(matches!(
            credentials_source(&partial),
            CredentialsSource::DefaultChain {
                region_name: Some("eu-west-1")
            }
        ));

        let without_region =
            Configuration::new("ake").with_credentials("AKIDEXAMPLE", "wJalrXUtnFEMI");
        assert!(matches!(
            credentials_source(&without_region),
            CredentialsSource::DefaultChain { region_name: None }
        ));

        let explicit = configuration("http://localhost:9000");
        match credentials_source(&explicit) {
            CredentialsSource::Explicit(credentials) => {
                assert_eq!(credentials.region_name, "us-east-1");
                assert_eq!(credentials.access_key_id, "AKIDEXAMPLE");
            }
            CredentialsSource::DefaultChain { .. } => panic!("expected explicit credentials"),
        }
    }

    #[tokio::test]
    async fn test_default_chain_without_region() {
        let sdk_config = SdkConfig::builder()
            .credentials_provider(explicit_credentials())
            .build();
        match resolve_sdk_config(&sdk_config) {
            Err(AdaptorError::Credentials { reason }) => assert_eq!(
                reason,
                "no region is configured, set region_name or AWS_REGION"
            ),
            other => panic!("unexpected result: {:?}", other.map(|(region, _)| region)),
        }
    }

    #[tokio::test]
    async fn test_default_chain_without_provider() {
        let sdk_config = SdkConfig::builder()
            .region(Region::new("eu-west-1"))
            .build();
        assert!(matches!(
            resolve_sdk_config(&sdk_config),
            Err(AdaptorError::Credentials { .. })
        ));
    }

    #[tokio::test]
    async fn test_default_chain() {
        let sdk_config = SdkConfig::builder()
            .region(Region::new("eu-west-1"))
            .credentials_provider(explicit_credentials())
            .build();
        let (region, credentials_provider) = resolve_sdk_config(&sdk_config).unwrap();
        assert_eq!(region.as_ref(), "eu-west-1");
        check_credentials(&credentials_provider).await.unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_credentials() {
        let error = check_credentials(&SharedCredentialsProvider::new(NoCredentials))
            .await
            .unwrap_err();
        assert!(matches!(error, AdaptorError::Credentials { .. }));
    }
}
