use aws_config::{BehaviorVersion, SdkConfig};
use std::sync::OnceLock;

pub const LOCAL_DYNAMODB_ENDPOINT: &str = "http://localhost:8000";

/// Lazily constructed AWS service clients sharing one resolved config
///
/// Each client is built on first access and cached for the lifetime of
/// the struct. `OnceLock` keeps first access safe when the struct is
/// shared across tasks.
pub struct Clients {
    config: SdkConfig,
    dynamodb_endpoint: Option<String>,
    iam: OnceLock<aws_sdk_iam::Client>,
    lambda: OnceLock<aws_sdk_lambda::Client>,
    s3: OnceLock<aws_sdk_s3::Client>,
    dynamodb: OnceLock<aws_sdk_dynamodb::Client>,
    ec2: OnceLock<aws_sdk_ec2::Client>,
}

impl Clients {
    pub async fn new(profile: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }

        Self::from_config(loader.load().await)
    }

    pub fn from_config(config: SdkConfig) -> Self {
        Self {
            config,
            dynamodb_endpoint: None,
            iam: OnceLock::new(),
            lambda: OnceLock::new(),
            s3: OnceLock::new(),
            dynamodb: OnceLock::new(),
            ec2: OnceLock::new(),
        }
    }

    /// Point the DynamoDB client at a local instance instead of AWS
    pub fn with_local_dynamodb(mut self) -> Self {
        self.dynamodb_endpoint = Some(LOCAL_DYNAMODB_ENDPOINT.to_string());
        self
    }

    pub fn region(&self) -> Option<String> {
        self.config.region().map(|region| region.to_string())
    }

    pub fn iam(&self) -> &aws_sdk_iam::Client {
        self.iam
            .get_or_init(|| aws_sdk_iam::Client::new(&self.config))
    }

    pub fn lambda(&self) -> &aws_sdk_lambda::Client {
        self.lambda
            .get_or_init(|| aws_sdk_lambda::Client::new(&self.config))
    }

    pub fn s3(&self) -> &aws_sdk_s3::Client {
        self.s3.get_or_init(|| aws_sdk_s3::Client::new(&self.config))
    }

    pub fn dynamodb(&self) -> &aws_sdk_dynamodb::Client {
        self.dynamodb.get_or_init(|| {
            let mut builder = aws_sdk_dynamodb::config::Builder::from(&self.config);

            if let Some(endpoint) = &self.dynamodb_endpoint {
                builder = builder.endpoint_url(endpoint);
            }

            aws_sdk_dynamodb::Client::from_conf(builder.build())
        })
    }

    pub fn ec2(&self) -> &aws_sdk_ec2::Client {
        self.ec2
            .get_or_init(|| aws_sdk_ec2::Client::new(&self.config))
    }
}
