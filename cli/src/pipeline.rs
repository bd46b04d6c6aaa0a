use crate::provider::{Functions, Identity};
use crate::publish::{FunctionDeployment, PublishOutcome};
use crate::{activation, bundle, deps, publish, role};
use eyre::WrapErr;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

/// Directory third-party packages are vendored into before bundling
const STAGING_DIR: &str = "package";

/// Fully resolved inputs for one deployment run
#[derive(Clone, Debug)]
pub struct DeployRequest {
    pub function_name: String,
    pub sources: Vec<PathBuf>,
    pub handler: String,
    pub runtime: String,
    pub timeout: u64,
    pub memory_size: u32,
    pub environment: HashMap<String, String>,
    pub services: Vec<String>,
    pub role_arn: Option<String>,
    pub requirements: Option<PathBuf>,
    pub output: PathBuf,
    pub update_if_exists: bool,
}

/// The full deployment flow over one identity and one function service
///
/// Steps run strictly in order: vendor dependencies, bundle, provision
/// the role, publish, wait for activation. One pipeline drives one
/// function name at a time, concurrent deploys of the same name race.
pub struct Pipeline<'a> {
    pub identity: &'a dyn Identity,
    pub functions: &'a dyn Functions,
}

impl Pipeline<'_> {
    pub async fn run(&self, request: &DeployRequest) -> eyre::Result<Option<PublishOutcome>> {
        let start_time = Instant::now();

        let mut sources = request.sources.clone();

        if let Some(requirements) = &request.requirements {
            let staging = PathBuf::from(STAGING_DIR);

            deps::install_dependencies(requirements, &staging)
                .await
                .wrap_err("Failed to install dependencies")?;

            sources.push(staging);
        }

        let bundle = bundle::bundle(&sources, &request.output)
            .await
            .wrap_err("Failed to package sources")?;

        let role_arn = match &request.role_arn {
            Some(arn) => arn.clone(),
            None => role::service_role(self.identity, &request.function_name, &request.services)
                .await
                .wrap_err("Failed to provision the execution role")?,
        };

        let mut deployment = FunctionDeployment::new(
            &request.function_name,
            &bundle.path,
            &request.handler,
            &role_arn,
        );

        deployment.runtime = request.runtime.clone();
        deployment.timeout = request.timeout;
        deployment.memory_size = request.memory_size;
        deployment.environment = request.environment.clone();
        deployment.update_if_exists = request.update_if_exists;

        let outcome = publish::publish(self.functions, &deployment)
            .await
            .wrap_err("Failed to publish the function")?;

        if outcome.is_some() {
            activation::wait_for_active(self.functions, &request.function_name)
                .await
                .wrap_err("Function did not become ready for traffic")?;
        }

        println!(
            "    {} in {:.2}s",
            console::style("Finished").green().bold(),
            start_time.elapsed().as_secs_f64(),
        );

        Ok(outcome)
    }
}

impl DeployRequest {
    /// Defaults matching `FunctionDeployment::new`
    pub fn new(function_name: &str, sources: Vec<PathBuf>, handler: &str) -> Self {
        Self {
            function_name: function_name.to_string(),
            sources,
            handler: handler.to_string(),
            runtime: crate::publish::DEFAULT_RUNTIME.to_string(),
            timeout: crate::publish::DEFAULT_TIMEOUT_SECONDS,
            memory_size: crate::publish::DEFAULT_MEMORY_MB,
            environment: HashMap::new(),
            services: Vec::new(),
            role_arn: None,
            requirements: None,
            output: PathBuf::from("function.zip"),
            update_if_exists: true,
        }
    }
}
