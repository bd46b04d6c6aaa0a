use crate::error::Error;
use crate::provider::Functions;
use crate::retry;
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_RUNTIME: &str = "python3.13";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_MEMORY_MB: u32 = 128;

/// Everything needed to create or update one function
#[derive(Clone, Debug)]
pub struct FunctionDeployment {
    pub name: String,
    pub archive: PathBuf,
    pub handler: String,
    pub role_arn: String,
    pub runtime: String,
    pub timeout: u64,
    pub memory_size: u32,
    pub environment: HashMap<String, String>,
    pub update_if_exists: bool,
}

impl FunctionDeployment {
    pub fn new(name: &str, archive: &std::path::Path, handler: &str, role_arn: &str) -> Self {
        Self {
            name: name.to_string(),
            archive: archive.to_path_buf(),
            handler: handler.to_string(),
            role_arn: role_arn.to_string(),
            runtime: DEFAULT_RUNTIME.to_string(),
            timeout: DEFAULT_TIMEOUT_SECONDS,
            memory_size: DEFAULT_MEMORY_MB,
            environment: HashMap::new(),
            update_if_exists: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PublishOutcome {
    pub arn: String,
    pub created: bool,
}

/// Create the function, or update it in place if it already exists
///
/// Returns `None` when the function exists and updates are disabled.
/// Code and configuration are updated as two sequential calls, a
/// failure between them leaves new code running with old configuration.
pub async fn publish(
    functions: &dyn Functions,
    deployment: &FunctionDeployment,
) -> Result<Option<PublishOutcome>, Error> {
    println!(
        "{} function {}",
        console::style("Deploying").green().bold(),
        console::style(&deployment.name).bold(),
    );

    let archive = tokio::fs::read(&deployment.archive).await?;

    match functions.get_function(&deployment.name).await {
        Ok(_) => {
            if !deployment.update_if_exists {
                log::info!(
                    "Function {} already exists and updates are disabled",
                    deployment.name,
                );
                println!(
                    "  {} Function {} already exists, skipping",
                    console::style("⚠").yellow(),
                    deployment.name,
                );
                return Ok(None);
            }

            update(functions, deployment, &archive).await.map(Some)
        }
        Err(err) if err.is_not_found() => create(functions, deployment, &archive).await.map(Some),
        Err(err) => Err(err),
    }
}

async fn update(
    functions: &dyn Functions,
    deployment: &FunctionDeployment,
    archive: &[u8],
) -> Result<PublishOutcome, Error> {
    let arn = functions
        .update_function_code(&deployment.name, archive)
        .await
        .inspect_err(|err| log::error!("Failed to update code of {}: {err}", deployment.name))?;

    println!(
        "  {} Updated function code",
        console::style("✓").green(),
    );

    functions
        .update_function_configuration(deployment)
        .await
        .inspect_err(|err| {
            log::error!("Failed to update configuration of {}: {err}", deployment.name)
        })?;

    println!(
        "  {} Updated function configuration",
        console::style("✓").green(),
    );

    Ok(PublishOutcome { arn, created: false })
}

/// Create the function, retrying while the fresh role is not assumable
///
/// IAM propagation can lag behind role creation. Only the distinguished
/// assumption error is retried, anything else fails the deployment
/// immediately. Exhausting the attempts propagates the last assumption
/// error.
async fn create(
    functions: &dyn Functions,
    deployment: &FunctionDeployment,
    archive: &[u8],
) -> Result<PublishOutcome, Error> {
    let policy = retry::ROLE_ASSUMPTION;

    let arn = policy
        .run(
            |attempt| async move {
                functions
                    .create_function(deployment, archive)
                    .await
                    .inspect_err(|err| {
                        if err.is_role_not_assumable() {
                            log::info!(
                                "Role not ready yet, retrying in {:?} (attempt {attempt}/{})",
                                policy.delay,
                                policy.max_attempts,
                            );
                        } else {
                            log::error!("Failed to create {}: {err}", deployment.name);
                        }
                    })
            },
            Error::is_role_not_assumable,
        )
        .await?;

    println!(
        "  {} Created function {}",
        console::style("✓").green(),
        deployment.name,
    );

    Ok(PublishOutcome { arn, created: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{FunctionRecord, InvokeOutput, LifecycleState};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;

    /// Function service fake with a configurable creation failure budget
    #[derive(Default)]
    pub(crate) struct FakeFunctions {
        pub exists: bool,
        /// Number of create attempts that fail with the assumption error
        pub unassumable_attempts: u32,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeFunctions {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Functions for FakeFunctions {
        async fn get_function(&self, name: &str) -> Result<FunctionRecord, Error> {
            self.calls.lock().unwrap().push("get".into());

            if !self.exists {
                return Err(Error::NotFound(format!("function {name}")));
            }

            Ok(FunctionRecord {
                name: name.to_string(),
                arn: format!("arn:aws:lambda:us-east-1:123456789012:function:{name}"),
                state: LifecycleState::Active,
                state_reason: None,
            })
        }

        async fn create_function(
            &self,
            deployment: &FunctionDeployment,
            _archive: &[u8],
        ) -> Result<String, Error> {
            let mut calls = self.calls.lock().unwrap();
            calls.push("create".into());

            let attempts = calls.iter().filter(|c| *c == "create").count() as u32;

            if attempts <= self.unassumable_attempts {
                return Err(Error::RoleNotAssumable {
                    message: "The role defined for the function cannot be assumed by Lambda"
                        .into(),
                });
            }

            Ok(format!(
                "arn:aws:lambda:us-east-1:123456789012:function:{}",
                deployment.name,
            ))
        }

        async fn update_function_code(
            &self,
            name: &str,
            _archive: &[u8],
        ) -> Result<String, Error> {
            self.calls.lock().unwrap().push("update_code".into());
            Ok(format!(
                "arn:aws:lambda:us-east-1:123456789012:function:{name}",
            ))
        }

        async fn update_function_configuration(
            &self,
            _deployment: &FunctionDeployment,
        ) -> Result<(), Error> {
            self.calls.lock().unwrap().push("update_config".into());
            Ok(())
        }

        async fn invoke(
            &self,
            _name: &str,
            _payload: &serde_json::Value,
            _tail_logs: bool,
        ) -> Result<InvokeOutput, Error> {
            self.calls.lock().unwrap().push("invoke".into());

            Ok(InvokeOutput {
                status: 200,
                payload: "{}".into(),
                logs: None,
                function_error: None,
            })
        }
    }

    fn deployment(dir: &tempfile::TempDir) -> FunctionDeployment {
        let archive = dir.path().join("function.zip");
        fs::write(&archive, b"zip bytes").unwrap();

        FunctionDeployment::new(
            "demo",
            &archive,
            "lambda_function.lambda_handler",
            "arn:aws:iam::123456789012:role/demo-execution-role",
        )
    }

    #[tokio::test(start_paused = true)]
    async fn creates_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let functions = FakeFunctions::default();

        let outcome = publish(&functions, &deployment(&dir)).await.unwrap().unwrap();

        assert!(outcome.created);
        assert_eq!(functions.calls(), ["get", "create"]);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_creation_while_role_is_not_assumable() {
        let dir = tempfile::tempdir().unwrap();

        // Assumable on the third attempt, so exactly two retries
        let functions = FakeFunctions {
            unassumable_attempts: 2,
            ..Default::default()
        };

        let outcome = publish(&functions, &deployment(&dir)).await.unwrap().unwrap();

        assert!(outcome.created);

        let creates = functions.calls().iter().filter(|c| *c == "create").count();
        assert_eq!(creates, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_propagate_the_assumption_error() {
        let dir = tempfile::tempdir().unwrap();

        let functions = FakeFunctions {
            unassumable_attempts: 99,
            ..Default::default()
        };

        let err = publish(&functions, &deployment(&dir)).await.unwrap_err();

        assert!(err.is_role_not_assumable());

        let creates = functions.calls().iter().filter(|c| *c == "create").count();
        assert_eq!(creates, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn updates_code_then_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let functions = FakeFunctions {
            exists: true,
            ..Default::default()
        };

        let outcome = publish(&functions, &deployment(&dir)).await.unwrap().unwrap();

        assert!(!outcome.created);
        assert_eq!(functions.calls(), ["get", "update_code", "update_config"]);
    }

    #[tokio::test(start_paused = true)]
    async fn existing_function_is_skipped_when_updates_are_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let functions = FakeFunctions {
            exists: true,
            ..Default::default()
        };

        let mut deployment = deployment(&dir);
        deployment.update_if_exists = false;

        let outcome = publish(&functions, &deployment).await.unwrap();

        assert!(outcome.is_none());
        assert_eq!(functions.calls(), ["get"]);
    }
}
