use crate::error::Error;
use crate::provider::{Functions, InvokeOutput, LifecycleState};
use crate::retry::{self, Retry};

/// Block until the function transitions from Pending to Active
///
/// A Failed state aborts immediately with the provider-supplied reason.
/// Transient fetch errors are treated like Pending and polled again.
pub async fn wait_for_active(functions: &dyn Functions, name: &str) -> Result<bool, Error> {
    wait_for_active_with(functions, name, retry::ACTIVATION).await
}

pub(crate) async fn wait_for_active_with(
    functions: &dyn Functions,
    name: &str,
    policy: Retry,
) -> Result<bool, Error> {
    let spinner = crate::logger::Logger::spinner("Waiting for function to become active...");

    let result = policy
        .run(
            |attempt| async move {
                let record = functions.get_function(name).await?;

                match record.state {
                    LifecycleState::Active => Ok(()),
                    LifecycleState::Failed => Err(Error::ActivationFailed {
                        name: name.to_string(),
                        reason: record
                            .state_reason
                            .unwrap_or_else(|| "Unknown".to_string()),
                    }),
                    state => {
                        log::info!(
                            "Function state: {} (check {attempt}/{})",
                            state.as_str(),
                            policy.max_attempts,
                        );

                        Err(Error::NotActive {
                            name: name.to_string(),
                            state: state.as_str().to_string(),
                        })
                    }
                }
            },
            // A terminal Failed state is the only thing not worth another poll
            |err| !matches!(err, Error::ActivationFailed { .. }),
        )
        .await;

    spinner.finish_and_clear();

    match result {
        Ok(()) => {
            println!(
                "  {} Function is active",
                console::style("✓").green(),
            );
            Ok(true)
        }
        Err(err @ Error::ActivationFailed { .. }) => Err(err),
        Err(_) => Err(Error::ActivationTimeout {
            name: name.to_string(),
            seconds: policy.bound().as_secs(),
        }),
    }
}

/// Wait for activation, then invoke the function with a test payload
pub async fn smoke_test(
    functions: &dyn Functions,
    name: &str,
    payload: &serde_json::Value,
    tail_logs: bool,
) -> Result<InvokeOutput, Error> {
    wait_for_active(functions, name).await?;

    let output = functions
        .invoke(name, payload, tail_logs)
        .await
        .inspect_err(|err| log::error!("Failed to invoke {name}: {err}"))?;

    println!(
        "  {} Function executed with status {}",
        console::style("✓").green(),
        output.status,
    );

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FunctionRecord;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Walks through a scripted sequence of states, one per poll
    struct ScriptedFunctions {
        states: Vec<Result<LifecycleState, ()>>,
        polls: AtomicU32,
    }

    impl ScriptedFunctions {
        fn new(states: Vec<Result<LifecycleState, ()>>) -> Self {
            Self {
                states,
                polls: AtomicU32::new(0),
            }
        }

        fn polls(&self) -> u32 {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Functions for ScriptedFunctions {
        async fn get_function(&self, name: &str) -> Result<FunctionRecord, Error> {
            let index = self.polls.fetch_add(1, Ordering::SeqCst) as usize;

            let state = self
                .states
                .get(index)
                .cloned()
                .unwrap_or(Ok(LifecycleState::Pending));

            match state {
                Ok(state) => Ok(FunctionRecord {
                    name: name.to_string(),
                    arn: "arn".into(),
                    state,
                    state_reason: Some("Insufficient permissions".into()),
                }),
                Err(()) => Err(Error::Provider {
                    code: "ServiceException".into(),
                    message: "transient".into(),
                }),
            }
        }

        async fn create_function(
            &self,
            _deployment: &crate::publish::FunctionDeployment,
            _archive: &[u8],
        ) -> Result<String, Error> {
            unreachable!()
        }

        async fn update_function_code(
            &self,
            _name: &str,
            _archive: &[u8],
        ) -> Result<String, Error> {
            unreachable!()
        }

        async fn update_function_configuration(
            &self,
            _deployment: &crate::publish::FunctionDeployment,
        ) -> Result<(), Error> {
            unreachable!()
        }

        async fn invoke(
            &self,
            _name: &str,
            _payload: &serde_json::Value,
            _tail_logs: bool,
        ) -> Result<InvokeOutput, Error> {
            Ok(InvokeOutput {
                status: 200,
                payload: "\"pong\"".into(),
                logs: None,
                function_error: None,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn active_after_pending_returns_true() {
        let functions = ScriptedFunctions::new(vec![
            Ok(LifecycleState::Pending),
            Ok(LifecycleState::Active),
        ]);

        assert!(wait_for_active(&functions, "demo").await.unwrap());
        assert_eq!(functions.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_fetch_errors_are_polled_through() {
        let functions = ScriptedFunctions::new(vec![
            Err(()),
            Err(()),
            Ok(LifecycleState::Active),
        ]);

        assert!(wait_for_active(&functions, "demo").await.unwrap());
        assert_eq!(functions.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_state_aborts_without_further_polling() {
        let functions = ScriptedFunctions::new(vec![
            Ok(LifecycleState::Pending),
            Ok(LifecycleState::Pending),
            Ok(LifecycleState::Failed),
        ]);

        let err = wait_for_active(&functions, "demo").await.unwrap_err();

        match err {
            Error::ActivationFailed { reason, .. } => {
                assert_eq!(reason, "Insufficient permissions");
            }
            other => panic!("unexpected error: {other}"),
        }

        // Stopped at the attempt that observed Failed, not at the retry ceiling
        assert_eq!(functions.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_names_the_elapsed_bound() {
        let functions = ScriptedFunctions::new(vec![]);

        let policy = Retry {
            max_attempts: 4,
            delay: Duration::from_secs(2),
        };

        let err = wait_for_active_with(&functions, "demo", policy)
            .await
            .unwrap_err();

        match err {
            Error::ActivationTimeout { seconds, .. } => assert_eq!(seconds, 8),
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(functions.polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn smoke_test_waits_then_invokes() {
        let functions = ScriptedFunctions::new(vec![
            Ok(LifecycleState::Pending),
            Ok(LifecycleState::Active),
        ]);

        let output = smoke_test(&functions, "demo", &serde_json::json!({}), false)
            .await
            .unwrap();

        assert_eq!(output.status, 200);
        assert_eq!(output.payload, "\"pong\"");
    }
}
