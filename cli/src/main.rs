use clap::{ArgAction, Parser, Subcommand};
use eyre::{OptionExt, WrapErr};
use skylift::clients::Clients;
use skylift::config::Manifest;
use skylift::logger::Logger;
use skylift::pipeline::{DeployRequest, Pipeline};
use skylift::provider::{IamIdentity, LambdaFunctions};
use skylift::{activation, envs, list, publish};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    arg_required_else_help = true,
    name = "skylift",
    version,
    about = "CLI tool for packaging and deploying Lambda functions",
    long_about = "Packages source files and dependencies into a deployment archive, provisions a function-specific execution role, and creates or updates the function with sensible defaults."
)]
struct Cli {
    /// AWS profile to authenticate with
    #[arg(short, long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package and deploy a function
    Deploy {
        /// Function name (falls back to skylift.toml)
        #[arg()]
        name: Option<String>,

        /// File or directory to include in the archive, repeatable
        #[arg(short, long = "source")]
        sources: Vec<PathBuf>,

        /// Handler, e.g. "lambda_function.lambda_handler"
        #[arg(long)]
        handler: Option<String>,

        #[arg(long)]
        runtime: Option<String>,

        /// Function timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Memory allocation in MB
        #[arg(long)]
        memory: Option<u32>,

        /// Services the function needs access to, e.g. "s3,dynamodb"
        #[arg(long = "service", value_delimiter = ',')]
        services: Vec<String>,

        /// Environment variable as KEY=VALUE, repeatable
        #[arg(short, long = "env", value_parser = parse_key_value)]
        environment: Vec<(String, String)>,

        /// Requirements file to vendor dependencies from
        #[arg(long)]
        requirements: Option<PathBuf>,

        /// Use an existing role instead of provisioning one
        #[arg(long)]
        role_arn: Option<String>,

        /// Where to write the deployment archive
        #[arg(long, default_value = "function.zip")]
        output: PathBuf,

        /// Fail quietly instead of updating an existing function
        #[arg(long, action = ArgAction::SetTrue)]
        no_update: bool,
    },

    /// Invoke a deployed function once it is active
    Invoke {
        #[arg()]
        name: String,

        /// JSON payload to send
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Print the tail of the execution log
        #[arg(short, long, action = ArgAction::SetTrue)]
        logs: bool,
    },

    /// List deployed functions
    List {},
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("Expected KEY=VALUE, got \"{s}\""))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    Logger::init();
    let cli = Cli::parse();
    let clients = Clients::new(cli.profile.as_deref()).await;

    match cli.command {
        Commands::Deploy {
            name,
            sources,
            handler,
            runtime,
            timeout,
            memory,
            services,
            environment,
            requirements,
            role_arn,
            output,
            no_update,
        } => {
            let manifest = Manifest::from_dir(Path::new("."))?.function;

            let name = name
                .or(manifest.name)
                .ok_or_eyre("Function name is required, pass it as an argument or set it in skylift.toml")?;

            let handler = handler
                .or(manifest.handler)
                .ok_or_eyre("Handler is required, pass --handler or set it in skylift.toml")?;

            let sources = if sources.is_empty() {
                manifest.sources
            } else {
                sources
            };

            if sources.is_empty() {
                eyre::bail!("At least one source path is required, pass --source");
            }

            let mut request = DeployRequest::new(&name, sources, &handler);

            request.runtime = runtime
                .or(manifest.runtime)
                .unwrap_or_else(|| publish::DEFAULT_RUNTIME.to_string());
            request.timeout = timeout
                .or(manifest.timeout)
                .unwrap_or(publish::DEFAULT_TIMEOUT_SECONDS);
            request.memory_size = memory
                .or(manifest.memory_size)
                .unwrap_or(publish::DEFAULT_MEMORY_MB);
            request.services = if services.is_empty() {
                manifest.services
            } else {
                services
            };
            request.role_arn = role_arn.or(manifest.role_arn);
            request.requirements = requirements.or(manifest.requirements);
            request.output = output;
            request.update_if_exists = !no_update;

            // Precedence: command line over manifest over .env
            let mut merged = envs::dotenv_vars();
            merged.extend(manifest.environment);
            merged.extend(environment);
            request.environment = merged;

            let identity = IamIdentity::new(clients.iam());
            let functions = LambdaFunctions::new(clients.lambda());

            Pipeline {
                identity: &identity,
                functions: &functions,
            }
            .run(&request)
            .await?;
        }

        Commands::Invoke {
            name,
            payload,
            logs,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).wrap_err("Payload is not valid JSON")?;

            let functions = LambdaFunctions::new(clients.lambda());
            let output = activation::smoke_test(&functions, &name, &payload, logs).await?;

            println!("{}", output.payload);

            if let Some(logs) = output.logs {
                println!("\n{}", console::style(logs).dim());
            }

            if let Some(error) = output.function_error {
                eyre::bail!("Function returned an error: {error}");
            }
        }

        Commands::List {} => {
            list::list(clients.lambda()).await?;
        }
    }

    Ok(())
}
