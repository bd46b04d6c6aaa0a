use crate::error::Error;
use crate::publish::FunctionDeployment;
use async_trait::async_trait;
use aws_sdk_lambda::error::ProvideErrorMetadata;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Environment, FunctionCode, LogType, Runtime, State};
use base64::prelude::{Engine as _, BASE64_STANDARD};

/// Translate a provider error into the local taxonomy
///
/// Not-found and role-propagation-lag conditions get distinguished
/// variants since the workflow branches on them. Everything else keeps
/// the original code and message untouched.
pub(crate) fn classify<E>(err: E, resource: &str) -> Error
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    let code = err.code().unwrap_or("Unknown").to_string();
    let message = err.message().unwrap_or("no error message").to_string();

    match code.as_str() {
        "NoSuchEntity" | "NoSuchEntityException" | "ResourceNotFoundException" => {
            Error::NotFound(resource.to_string())
        }
        "InvalidParameterValueException" if message.contains("cannot be assumed") => {
            Error::RoleNotAssumable { message }
        }
        _ => {
            log::error!("Provider error for {resource}: {code} - {message}");
            Error::Provider { code, message }
        }
    }
}

#[derive(Clone, Debug)]
pub struct RoleRecord {
    pub name: String,
    pub arn: String,
}

/// Lifecycle state of a deployed function
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Pending,
    Active,
    Inactive,
    Failed,
    Other(String),
}

impl LifecycleState {
    pub fn as_str(&self) -> &str {
        match self {
            LifecycleState::Pending => "Pending",
            LifecycleState::Active => "Active",
            LifecycleState::Inactive => "Inactive",
            LifecycleState::Failed => "Failed",
            LifecycleState::Other(state) => state,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FunctionRecord {
    pub name: String,
    pub arn: String,
    pub state: LifecycleState,
    pub state_reason: Option<String>,
}

#[derive(Clone, Debug)]
pub struct InvokeOutput {
    pub status: i32,
    pub payload: String,
    pub logs: Option<String>,
    pub function_error: Option<String>,
}

/// Identity service operations the role provisioner depends on
#[async_trait]
pub trait Identity: Send + Sync {
    async fn get_role(&self, name: &str) -> Result<RoleRecord, Error>;

    async fn create_role(
        &self,
        name: &str,
        trust_policy: &serde_json::Value,
        description: &str,
    ) -> Result<RoleRecord, Error>;

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), Error>;
}

/// Function service operations the publisher and waiter depend on
#[async_trait]
pub trait Functions: Send + Sync {
    async fn get_function(&self, name: &str) -> Result<FunctionRecord, Error>;

    /// Returns the ARN of the created function
    async fn create_function(
        &self,
        deployment: &FunctionDeployment,
        archive: &[u8],
    ) -> Result<String, Error>;

    /// Returns the ARN of the updated function
    async fn update_function_code(&self, name: &str, archive: &[u8]) -> Result<String, Error>;

    async fn update_function_configuration(
        &self,
        deployment: &FunctionDeployment,
    ) -> Result<(), Error>;

    async fn invoke(
        &self,
        name: &str,
        payload: &serde_json::Value,
        tail_logs: bool,
    ) -> Result<InvokeOutput, Error>;
}

/// IAM-backed identity service
pub struct IamIdentity {
    client: aws_sdk_iam::Client,
}

impl IamIdentity {
    pub fn new(client: &aws_sdk_iam::Client) -> Self {
        Self {
            client: client.clone(),
        }
    }
}

#[async_trait]
impl Identity for IamIdentity {
    async fn get_role(&self, name: &str) -> Result<RoleRecord, Error> {
        let output = self
            .client
            .get_role()
            .role_name(name)
            .send()
            .await
            .map_err(|err| classify(err, &format!("role {name}")))?;

        let role = output.role().ok_or_else(|| Error::Provider {
            code: "MalformedResponse".into(),
            message: format!("get_role returned no role for {name}"),
        })?;

        Ok(RoleRecord {
            name: role.role_name().to_string(),
            arn: role.arn().to_string(),
        })
    }

    async fn create_role(
        &self,
        name: &str,
        trust_policy: &serde_json::Value,
        description: &str,
    ) -> Result<RoleRecord, Error> {
        let output = self
            .client
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_policy.to_string())
            .description(description)
            .send()
            .await
            .map_err(|err| classify(err, &format!("role {name}")))?;

        let role = output.role().ok_or_else(|| Error::Provider {
            code: "MalformedResponse".into(),
            message: format!("create_role returned no role for {name}"),
        })?;

        Ok(RoleRecord {
            name: role.role_name().to_string(),
            arn: role.arn().to_string(),
        })
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), Error> {
        self.client
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|err| classify(err, &format!("policy {policy_arn}")))?;

        Ok(())
    }
}

/// Lambda-backed function service
pub struct LambdaFunctions {
    client: aws_sdk_lambda::Client,
}

impl LambdaFunctions {
    pub fn new(client: &aws_sdk_lambda::Client) -> Self {
        Self {
            client: client.clone(),
        }
    }
}

#[async_trait]
impl Functions for LambdaFunctions {
    async fn get_function(&self, name: &str) -> Result<FunctionRecord, Error> {
        let output = self
            .client
            .get_function()
            .function_name(name)
            .send()
            .await
            .map_err(|err| classify(err, &format!("function {name}")))?;

        let config = output.configuration().ok_or_else(|| Error::Provider {
            code: "MalformedResponse".into(),
            message: format!("get_function returned no configuration for {name}"),
        })?;

        let state = match config.state() {
            Some(State::Active) => LifecycleState::Active,
            Some(State::Failed) => LifecycleState::Failed,
            Some(State::Inactive) => LifecycleState::Inactive,
            Some(State::Pending) | None => LifecycleState::Pending,
            Some(other) => LifecycleState::Other(other.as_str().to_string()),
        };

        Ok(FunctionRecord {
            name: config.function_name().unwrap_or(name).to_string(),
            arn: config.function_arn().unwrap_or_default().to_string(),
            state,
            state_reason: config.state_reason().map(str::to_string),
        })
    }

    async fn create_function(
        &self,
        deployment: &FunctionDeployment,
        archive: &[u8],
    ) -> Result<String, Error> {
        let mut request = self
            .client
            .create_function()
            .function_name(&deployment.name)
            .runtime(Runtime::from(deployment.runtime.as_str()))
            .role(&deployment.role_arn)
            .handler(&deployment.handler)
            .code(
                FunctionCode::builder()
                    .zip_file(Blob::new(archive.to_vec()))
                    .build(),
            )
            .timeout(deployment.timeout as i32)
            .memory_size(deployment.memory_size as i32)
            .publish(true);

        if !deployment.environment.is_empty() {
            request = request.environment(
                Environment::builder()
                    .set_variables(Some(deployment.environment.clone()))
                    .build(),
            );
        }

        let output = request
            .send()
            .await
            .map_err(|err| classify(err, &format!("function {}", deployment.name)))?;

        Ok(output.function_arn().unwrap_or_default().to_string())
    }

    async fn update_function_code(&self, name: &str, archive: &[u8]) -> Result<String, Error> {
        let output = self
            .client
            .update_function_code()
            .function_name(name)
            .zip_file(Blob::new(archive.to_vec()))
            .send()
            .await
            .map_err(|err| classify(err, &format!("function {name}")))?;

        Ok(output.function_arn().unwrap_or_default().to_string())
    }

    async fn update_function_configuration(
        &self,
        deployment: &FunctionDeployment,
    ) -> Result<(), Error> {
        self.client
            .update_function_configuration()
            .function_name(&deployment.name)
            .runtime(Runtime::from(deployment.runtime.as_str()))
            .role(&deployment.role_arn)
            .handler(&deployment.handler)
            .timeout(deployment.timeout as i32)
            .memory_size(deployment.memory_size as i32)
            // Always sent so that removed variables actually disappear
            .environment(
                Environment::builder()
                    .set_variables(Some(deployment.environment.clone()))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| classify(err, &format!("function {}", deployment.name)))?;

        Ok(())
    }

    async fn invoke(
        &self,
        name: &str,
        payload: &serde_json::Value,
        tail_logs: bool,
    ) -> Result<InvokeOutput, Error> {
        let request = self
            .client
            .invoke()
            .function_name(name)
            .payload(Blob::new(serde_json::to_vec(payload)?));

        let request = if tail_logs {
            request.log_type(LogType::Tail)
        } else {
            request
        };

        let output = request
            .send()
            .await
            .map_err(|err| classify(err, &format!("function {name}")))?;

        // Tail logs come back base64-encoded
        let logs = output
            .log_result()
            .and_then(|encoded| BASE64_STANDARD.decode(encoded).ok())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

        Ok(InvokeOutput {
            status: output.status_code(),
            payload: output
                .payload()
                .map(|blob| String::from_utf8_lossy(blob.as_ref()).into_owned())
                .unwrap_or_default(),
            logs,
            function_error: output.function_error().map(str::to_string),
        })
    }
}
