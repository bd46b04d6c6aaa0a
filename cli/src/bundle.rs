use crate::error::Error;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Direct-upload ceiling imposed by the function service
pub const MAX_ARCHIVE_MIB: f64 = 50.0;

/// A written deployment archive
#[derive(Clone, Debug)]
pub struct Bundle {
    pub path: PathBuf,
    pub size_mib: f64,
}

impl Bundle {
    /// False when the archive is too large for direct upload and has to
    /// go through an alternate path, e.g. upload to S3 first
    pub fn is_within_limit(&self) -> bool {
        self.size_mib <= MAX_ARCHIVE_MIB
    }
}

/// Package source files and directories into a single zip archive
///
/// Single files land under their base name. Directories are walked
/// recursively, every file keeping its path relative to the directory's
/// parent, so one level of the directory name survives in the archive.
///
/// The archive is written even when it exceeds the size ceiling, the
/// overage is only reported through `Bundle::is_within_limit`.
pub async fn bundle(sources: &[PathBuf], output: &Path) -> Result<Bundle, Error> {
    let sources = sources.to_vec();
    let output = output.to_path_buf();

    println!(
        "{} {}",
        console::style("Packaging").green().bold(),
        output.display(),
    );

    // Zip crate doesn't have async support, so we have to use a blocking task here
    let bundle = tokio::task::spawn_blocking(move || write_archive(&sources, &output))
        .await
        .map_err(|err| Error::Io(std::io::Error::other(err)))??;

    if bundle.is_within_limit() {
        println!(
            "  {} Archive size: {:.2} MiB",
            console::style("✓").green(),
            bundle.size_mib,
        );
    } else {
        println!(
            "  {} Archive is {:.2} MiB which exceeds the {MAX_ARCHIVE_MIB} MiB direct upload limit. Consider uploading to S3 instead.",
            console::style("⚠").yellow(),
            bundle.size_mib,
        );
    }

    Ok(bundle)
}

fn write_archive(sources: &[PathBuf], output: &Path) -> Result<Bundle, Error> {
    let file = File::create(output)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for source in sources {
        // A missing source is a hard error, not a skip
        let metadata = std::fs::metadata(source)?;

        if metadata.is_file() {
            let name = source
                .file_name()
                .ok_or_else(|| Error::InvalidInput(format!("Invalid source path {source:?}")))?
                .to_string_lossy()
                .into_owned();

            add_file(&mut zip, source, &name, options)?;
            log::debug!("Added file {name}");
            continue;
        }

        let base = source.parent().unwrap_or_else(|| Path::new(""));

        for entry in WalkDir::new(source) {
            let entry = entry.map_err(|err| Error::Io(std::io::Error::other(err)))?;

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(base)
                .map_err(|err| Error::InvalidInput(err.to_string()))?;

            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            add_file(&mut zip, entry.path(), &name, options)?;
        }

        log::debug!("Added directory {}", source.display());
    }

    zip.finish()?;

    let size_mib = std::fs::metadata(output)?.len() as f64 / (1024.0 * 1024.0);

    Ok(Bundle {
        path: output.to_path_buf(),
        size_mib,
    })
}

fn add_file(
    zip: &mut ZipWriter<File>,
    path: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> Result<(), Error> {
    zip.start_file(name, options)?;

    let mut file = File::open(path)?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    zip.write_all(&buffer)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;

    fn archive_names(path: &Path) -> BTreeSet<String> {
        let file = File::open(path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();

        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[tokio::test]
    async fn directory_entries_are_relative_to_the_parent() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("handlers");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("main.py"), "def handler(): pass").unwrap();
        fs::write(src.join("nested").join("helper.py"), "x = 1").unwrap();
        fs::write(dir.path().join("top.py"), "y = 2").unwrap();

        let output = dir.path().join("function.zip");

        let result = bundle(&[src, dir.path().join("top.py")], &output)
            .await
            .unwrap();

        assert!(result.is_within_limit());

        let names = archive_names(&output);
        let expected: BTreeSet<String> = [
            "handlers/main.py".to_string(),
            "handlers/nested/helper.py".to_string(),
            "top.py".to_string(),
        ]
        .into();

        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("function.zip");

        let result = bundle(&[dir.path().join("no-such-file.py")], &output).await;

        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn limit_boundary() {
        let over = Bundle {
            path: PathBuf::from("a.zip"),
            size_mib: 50.01,
        };
        let under = Bundle {
            path: PathBuf::from("b.zip"),
            size_mib: 49.99,
        };

        assert!(!over.is_within_limit());
        assert!(under.is_within_limit());
    }
}
