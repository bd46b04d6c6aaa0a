use rust_dotenv::dotenv::DotEnv;
use std::collections::HashMap;
use std::path::Path;

/// Environment variables from a .env file in the current directory
///
/// Merged into the function environment with lower precedence than the
/// manifest and the command line.
pub fn dotenv_vars() -> HashMap<String, String> {
    if !Path::new(".env").exists() {
        log::debug!("No .env file found");
        return HashMap::new();
    }

    DotEnv::new("").all_vars().to_owned()
}
