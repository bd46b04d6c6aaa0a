use crate::error::Error;
use std::path::Path;
use tokio::process::Command;

/// Install third-party packages into a staging directory for bundling
///
/// Sub-dependencies are skipped to keep the archive small and avoid
/// version conflicts with the runtime-provided packages.
pub async fn install_dependencies(requirements: &Path, target: &Path) -> Result<(), Error> {
    println!(
        "{} dependencies from {} into {}/",
        console::style("Installing").green().bold(),
        requirements.display(),
        target.display(),
    );

    tokio::fs::create_dir_all(target).await?;

    let output = Command::new("python3")
        .arg("-m")
        .arg("pip")
        .arg("install")
        .arg("-r")
        .arg(requirements)
        .arg("-t")
        .arg(target)
        .arg("--no-deps")
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        log::error!("pip install failed: {stderr}");
        return Err(Error::Dependencies(stderr));
    }

    println!(
        "  {} Dependencies installed",
        console::style("✓").green(),
    );

    Ok(())
}
