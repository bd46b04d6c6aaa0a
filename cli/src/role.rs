use crate::error::Error;
use crate::provider::{classify, Identity, RoleRecord};
use crate::retry;
use serde_json::json;

/// Required for all Lambda functions, attached unconditionally
pub const BASE_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// Service categories a function may request access to, mapped to the
/// corresponding managed policy
const SERVICE_POLICIES: [(&str, &str); 6] = [
    ("s3", "arn:aws:iam::aws:policy/AmazonS3FullAccess"),
    ("dynamodb", "arn:aws:iam::aws:policy/AmazonDynamoDBFullAccess"),
    ("sqs", "arn:aws:iam::aws:policy/AmazonSQSFullAccess"),
    ("sns", "arn:aws:iam::aws:policy/AmazonSNSFullAccess"),
    ("rds", "arn:aws:iam::aws:policy/AmazonRDSDataFullAccess"),
    ("secretsmanager", "arn:aws:iam::aws:policy/SecretsManagerReadWrite"),
];

/// Only the Lambda service may assume execution roles
fn trust_policy() -> serde_json::Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": {
                    "Service": "lambda.amazonaws.com"
                },
                "Action": "sts:AssumeRole"
            }
        ]
    })
}

/// Ensure an execution role exists and return its ARN
///
/// An existing role with the same name is reused as-is, its attached
/// policies are not reconciled against `additional_policies`. A fresh
/// role is created with the Lambda trust policy, gets the base
/// execution policy plus the additional ones, and the call blocks until
/// the role is observably retrievable.
pub async fn ensure_role(
    identity: &dyn Identity,
    role_name: &str,
    additional_policies: &[String],
) -> Result<String, Error> {
    match identity.get_role(role_name).await {
        Ok(role) => {
            println!(
                "{} existing IAM role {}",
                console::style("Using").green().bold(),
                console::style(role_name).bold(),
            );
            return Ok(role.arn);
        }
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err),
    }

    println!(
        "{} IAM role {}",
        console::style("Creating").green().bold(),
        console::style(role_name).bold(),
    );

    let role = identity
        .create_role(
            role_name,
            &trust_policy(),
            "Execution role for Lambda functions",
        )
        .await?;

    identity
        .attach_role_policy(role_name, BASE_EXECUTION_POLICY)
        .await?;

    for policy in additional_policies {
        // One bad policy must not abort provisioning
        match identity.attach_role_policy(role_name, policy).await {
            Ok(()) => println!("  {} Attached policy {policy}", console::style("✓").green()),
            Err(err) => {
                log::warn!("Failed to attach policy {policy}: {err}");
                println!(
                    "  {} Failed to attach policy {policy}",
                    console::style("✗").red(),
                );
            }
        }
    }

    wait_for_propagation(identity, role_name).await?;
    Ok(role.arn)
}

/// Derive a function-specific role and ensure it exists
///
/// The role is named `<function_name>-execution-role`. Service names
/// are matched case-insensitively, unrecognized ones are skipped with a
/// warning instead of failing the deployment.
pub async fn service_role(
    identity: &dyn Identity,
    function_name: &str,
    required_services: &[String],
) -> Result<String, Error> {
    let role_name = format!("{function_name}-execution-role");
    let mut additional = Vec::new();

    for service in required_services {
        let service_lower = service.to_lowercase();

        match SERVICE_POLICIES
            .iter()
            .find(|(name, _)| *name == service_lower)
        {
            Some((_, arn)) => additional.push(arn.to_string()),
            None => {
                let known = SERVICE_POLICIES.map(|(name, _)| name).join(", ");
                log::warn!("Unknown service {service}, available: {known}");
                println!(
                    "  {} Unknown service {}, available: {known}",
                    console::style("⚠").yellow(),
                    console::style(service).bold(),
                );
            }
        }
    }

    ensure_role(identity, &role_name, &additional).await
}

/// All roles in the account, following pagination to the end
pub async fn list_roles(client: &aws_sdk_iam::Client) -> Result<Vec<RoleRecord>, Error> {
    let mut stream = client.list_roles().into_paginator().items().send();
    let mut roles = Vec::new();

    while let Some(role) = stream.next().await {
        let role = role.map_err(|err| classify(err, "roles"))?;

        roles.push(RoleRecord {
            name: role.role_name().to_string(),
            arn: role.arn().to_string(),
        });
    }

    Ok(roles)
}

/// Look a role up by name across the account listing
///
/// An absent role surfaces as the distinguished not-found condition so
/// callers can branch on it the same way the provisioner does.
pub async fn validate_role(
    client: &aws_sdk_iam::Client,
    name: &str,
) -> Result<RoleRecord, Error> {
    let roles = list_roles(client).await?;

    find_role(&roles, name)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("role {name}")))
}

fn find_role<'a>(roles: &'a [RoleRecord], name: &str) -> Option<&'a RoleRecord> {
    roles.iter().find(|role| role.name == name)
}

/// Block until a freshly created role can actually be fetched
///
/// IAM is eventually consistent, so even a successful fetch is followed
/// by one more delay to give downstream services a chance to catch up.
/// Exhausting the attempts propagates the last fetch error.
async fn wait_for_propagation(identity: &dyn Identity, role_name: &str) -> Result<(), Error> {
    let policy = retry::ROLE_PROPAGATION;
    let spinner = crate::logger::Logger::spinner("Waiting for IAM role to propagate...");

    let result = policy
        .run(
            |attempt| async move {
                identity.get_role(role_name).await?;
                log::debug!("Role propagation check {attempt}/{}", policy.max_attempts);
                Ok(())
            },
            |_| true,
        )
        .await;

    if result.is_ok() {
        tokio::time::sleep(policy.delay).await;
    }

    spinner.finish_and_clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RoleRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records calls and serves roles created during the test
    #[derive(Default)]
    struct FakeIdentity {
        existing: Mutex<Vec<String>>,
        calls: Mutex<Vec<String>>,
        failing_policies: Vec<String>,
    }

    impl FakeIdentity {
        fn with_existing(name: &str) -> Self {
            Self {
                existing: Mutex::new(vec![name.to_string()]),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Identity for FakeIdentity {
        async fn get_role(&self, name: &str) -> Result<RoleRecord, Error> {
            self.calls.lock().unwrap().push(format!("get:{name}"));

            if self.existing.lock().unwrap().iter().any(|r| r == name) {
                return Ok(RoleRecord {
                    name: name.to_string(),
                    arn: format!("arn:aws:iam::123456789012:role/{name}"),
                });
            }

            Err(Error::NotFound(format!("role {name}")))
        }

        async fn create_role(
            &self,
            name: &str,
            _trust_policy: &serde_json::Value,
            _description: &str,
        ) -> Result<RoleRecord, Error> {
            self.calls.lock().unwrap().push(format!("create:{name}"));
            self.existing.lock().unwrap().push(name.to_string());

            Ok(RoleRecord {
                name: name.to_string(),
                arn: format!("arn:aws:iam::123456789012:role/{name}"),
            })
        }

        async fn attach_role_policy(
            &self,
            role_name: &str,
            policy_arn: &str,
        ) -> Result<(), Error> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("attach:{role_name}:{policy_arn}"));

            if self.failing_policies.iter().any(|p| p == policy_arn) {
                return Err(Error::Provider {
                    code: "InvalidInput".into(),
                    message: format!("bad policy {policy_arn}"),
                });
            }

            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn existing_role_is_reused_without_mutation() {
        let identity = FakeIdentity::with_existing("app-execution-role");

        let arn = ensure_role(&identity, "app-execution-role", &["whatever".into()])
            .await
            .unwrap();

        assert_eq!(arn, "arn:aws:iam::123456789012:role/app-execution-role");
        assert_eq!(identity.calls(), vec!["get:app-execution-role"]);
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_role_is_idempotent() {
        let identity = FakeIdentity::default();

        let first = ensure_role(&identity, "demo-execution-role", &[])
            .await
            .unwrap();
        let calls_after_first = identity.calls().len();

        let second = ensure_role(&identity, "demo-execution-role", &[])
            .await
            .unwrap();

        assert_eq!(first, second);

        // The second call performs a single lookup, no create or attach
        let new_calls = &identity.calls()[calls_after_first..];
        assert_eq!(new_calls, ["get:demo-execution-role"]);
    }

    #[tokio::test(start_paused = true)]
    async fn creation_attaches_base_policy_first() {
        let identity = FakeIdentity::default();

        ensure_role(
            &identity,
            "demo-execution-role",
            &["arn:aws:iam::aws:policy/AmazonS3FullAccess".into()],
        )
        .await
        .unwrap();

        let calls = identity.calls();
        assert_eq!(calls[0], "get:demo-execution-role");
        assert_eq!(calls[1], "create:demo-execution-role");
        assert_eq!(
            calls[2],
            format!("attach:demo-execution-role:{BASE_EXECUTION_POLICY}"),
        );
        assert_eq!(
            calls[3],
            "attach:demo-execution-role:arn:aws:iam::aws:policy/AmazonS3FullAccess",
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failing_additional_policy_is_not_fatal() {
        let identity = FakeIdentity {
            failing_policies: vec!["arn:aws:iam::aws:policy/AmazonSQSFullAccess".into()],
            ..Default::default()
        };

        let arn = ensure_role(
            &identity,
            "demo-execution-role",
            &[
                "arn:aws:iam::aws:policy/AmazonSQSFullAccess".into(),
                "arn:aws:iam::aws:policy/AmazonSNSFullAccess".into(),
            ],
        )
        .await
        .unwrap();

        assert!(arn.ends_with("demo-execution-role"));

        // The policy after the failing one was still attempted
        assert!(identity.calls().iter().any(|c| c.contains("AmazonSNSFullAccess")));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_service_names_are_skipped() {
        let identity = FakeIdentity::default();

        let arn = service_role(
            &identity,
            "demo",
            &["S3".into(), "blockchain".into(), "DynamoDB".into()],
        )
        .await
        .unwrap();

        assert!(arn.ends_with("demo-execution-role"));

        let attached: Vec<String> = identity
            .calls()
            .iter()
            .filter(|c| c.starts_with("attach:"))
            .cloned()
            .collect();

        // Base policy plus the two recognized services, nothing for the unknown one
        assert_eq!(attached.len(), 3);
        assert!(attached[1].contains("AmazonS3FullAccess"));
        assert!(attached[2].contains("AmazonDynamoDBFullAccess"));
    }

    #[test]
    fn role_lookup_matches_on_the_exact_name() {
        let roles = vec![
            RoleRecord {
                name: "demo-execution-role".into(),
                arn: "arn:aws:iam::123456789012:role/demo-execution-role".into(),
            },
            RoleRecord {
                name: "other".into(),
                arn: "arn:aws:iam::123456789012:role/other".into(),
            },
        ];

        let found = find_role(&roles, "demo-execution-role").unwrap();
        assert!(found.arn.ends_with("demo-execution-role"));

        assert!(find_role(&roles, "demo").is_none());
        assert!(find_role(&roles, "DEMO-EXECUTION-ROLE").is_none());
    }

    #[test]
    fn trust_policy_binds_the_lambda_principal() {
        let policy = trust_policy();

        assert_eq!(
            policy["Statement"][0]["Principal"]["Service"],
            "lambda.amazonaws.com",
        );
        assert_eq!(policy["Statement"][0]["Action"], "sts:AssumeRole");
    }
}
