//! Thin S3 wrappers with the façade's defaults baked in

use crate::error::Error;
use crate::provider::classify;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration, Delete,
    ObjectIdentifier, VersioningConfiguration,
};
use std::path::Path;

/// A readable prefix with a random suffix to dodge the global namespace
pub fn unique_bucket_name(prefix: &str) -> String {
    let suffix: String = uuid::Uuid::new_v4().to_string().chars().take(8).collect();
    format!("{prefix}-{suffix}")
}

/// Create a bucket named `<prefix>-<random>` in the client's region
pub async fn create_bucket(
    client: &aws_sdk_s3::Client,
    prefix: &str,
    region: Option<&str>,
) -> Result<String, Error> {
    let name = unique_bucket_name(prefix);
    let mut request = client.create_bucket().bucket(&name);

    // us-east-1 rejects an explicit location constraint
    if let Some(region) = region.filter(|region| *region != "us-east-1") {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build(),
        );
    }

    request
        .send()
        .await
        .map_err(|err| classify(err, &format!("bucket {name}")))?;

    println!(
        "{} bucket {name}",
        console::style("Created").green().bold(),
    );

    Ok(name)
}

pub async fn list_buckets(client: &aws_sdk_s3::Client) -> Result<Vec<String>, Error> {
    let output = client
        .list_buckets()
        .send()
        .await
        .map_err(|err| classify(err, "buckets"))?;

    Ok(output
        .buckets()
        .iter()
        .filter_map(|bucket| bucket.name().map(str::to_string))
        .collect())
}

/// Object keys and sizes in a bucket
pub async fn list_objects(
    client: &aws_sdk_s3::Client,
    bucket: &str,
) -> Result<Vec<(String, i64)>, Error> {
    let output = client
        .list_objects_v2()
        .bucket(bucket)
        .send()
        .await
        .map_err(|err| classify(err, &format!("bucket {bucket}")))?;

    Ok(output
        .contents()
        .iter()
        .filter_map(|object| {
            object
                .key()
                .map(|key| (key.to_string(), object.size().unwrap_or_default()))
        })
        .collect())
}

pub async fn upload_file(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    path: &Path,
) -> Result<(), Error> {
    let body = ByteStream::from_path(path)
        .await
        .map_err(|err| Error::Io(std::io::Error::other(err)))?;

    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(body)
        .send()
        .await
        .map_err(|err| classify(err, &format!("object {key}")))?;

    println!(
        "  {} Uploaded {key} to {bucket}",
        console::style("✓").green(),
    );

    Ok(())
}

/// Fetch a file over HTTP and store it as an object
pub async fn upload_from_url(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    url: &str,
) -> Result<(), Error> {
    let bytes = reqwest::get(url)
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(bytes.to_vec()))
        .send()
        .await
        .map_err(|err| classify(err, &format!("object {key}")))?;

    println!(
        "  {} Uploaded {key} to {bucket}",
        console::style("✓").green(),
    );

    Ok(())
}

pub async fn copy_object(
    client: &aws_sdk_s3::Client,
    from_bucket: &str,
    to_bucket: &str,
    key: &str,
) -> Result<(), Error> {
    client
        .copy_object()
        .copy_source(format!("{from_bucket}/{key}"))
        .bucket(to_bucket)
        .key(key)
        .send()
        .await
        .map_err(|err| classify(err, &format!("object {key}")))?;

    Ok(())
}

/// Delete several objects in one batch request
pub async fn delete_objects(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    keys: &[String],
) -> Result<(), Error> {
    let objects = keys
        .iter()
        .map(|key| {
            ObjectIdentifier::builder()
                .key(key)
                .build()
                .map_err(|err| Error::InvalidInput(err.to_string()))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let delete = Delete::builder()
        .set_objects(Some(objects))
        .build()
        .map_err(|err| Error::InvalidInput(err.to_string()))?;

    client
        .delete_objects()
        .bucket(bucket)
        .delete(delete)
        .send()
        .await
        .map_err(|err| classify(err, &format!("bucket {bucket}")))?;

    println!(
        "  {} Deleted {} object(s) from {bucket}",
        console::style("✓").green(),
        keys.len(),
    );

    Ok(())
}

pub async fn enable_versioning(client: &aws_sdk_s3::Client, bucket: &str) -> Result<(), Error> {
    client
        .put_bucket_versioning()
        .bucket(bucket)
        .versioning_configuration(
            VersioningConfiguration::builder()
                .status(BucketVersioningStatus::Enabled)
                .build(),
        )
        .send()
        .await
        .map_err(|err| classify(err, &format!("bucket {bucket}")))?;

    Ok(())
}
