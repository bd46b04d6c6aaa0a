//! Thin EC2 instance lifecycle wrappers

use crate::error::Error;
use crate::provider::classify;
use aws_sdk_ec2::types::{InstanceType, ResourceType, Tag, TagSpecification};

pub const DEFAULT_INSTANCE_TYPE: &str = "t2.micro";

#[derive(Clone, Debug)]
pub struct InstanceSummary {
    pub id: String,
    pub state: String,
    pub name: Option<String>,
    pub instance_type: String,
    pub image_id: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
}

/// Everything needed to launch one batch of instances
///
/// Only the image is required, the rest defaults to the façade's
/// smallest footprint.
#[derive(Clone, Debug)]
pub struct InstanceRequest {
    pub image_id: String,
    pub instance_type: String,
    pub count: i32,
    pub key_name: Option<String>,
    pub security_group_ids: Vec<String>,
    pub subnet_id: Option<String>,
    pub tags: Vec<(String, String)>,
}

impl InstanceRequest {
    pub fn new(image_id: &str) -> Self {
        Self {
            image_id: image_id.to_string(),
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            count: 1,
            key_name: None,
            security_group_ids: Vec::new(),
            subnet_id: None,
            tags: Vec::new(),
        }
    }
}

fn tag_specification(tags: &[(String, String)]) -> Option<TagSpecification> {
    (!tags.is_empty()).then(|| {
        TagSpecification::builder()
            .resource_type(ResourceType::Instance)
            .set_tags(Some(
                tags.iter()
                    .map(|(key, value)| Tag::builder().key(key).value(value).build())
                    .collect(),
            ))
            .build()
    })
}

/// Launch one or more instances, returning their ids
pub async fn create_instances(
    client: &aws_sdk_ec2::Client,
    request: &InstanceRequest,
) -> Result<Vec<String>, Error> {
    let image_id = &request.image_id;

    let output = client
        .run_instances()
        .image_id(image_id)
        .instance_type(InstanceType::from(request.instance_type.as_str()))
        .min_count(request.count)
        .max_count(request.count)
        .set_key_name(request.key_name.clone())
        .set_security_group_ids(
            (!request.security_group_ids.is_empty())
                .then(|| request.security_group_ids.clone()),
        )
        .set_subnet_id(request.subnet_id.clone())
        .set_tag_specifications(tag_specification(&request.tags).map(|spec| vec![spec]))
        .send()
        .await
        .map_err(|err| classify(err, &format!("image {image_id}")))?;

    let ids: Vec<String> = output
        .instances()
        .iter()
        .filter_map(|instance| instance.instance_id().map(str::to_string))
        .collect();

    println!(
        "{} instance(s): {}",
        console::style("Created").green().bold(),
        ids.join(", "),
    );

    Ok(ids)
}

pub async fn start_instances(
    client: &aws_sdk_ec2::Client,
    instance_ids: &[String],
) -> Result<(), Error> {
    client
        .start_instances()
        .set_instance_ids(Some(instance_ids.to_vec()))
        .send()
        .await
        .map_err(|err| classify(err, "instances"))?;

    println!(
        "{} instance(s): {}",
        console::style("Started").green().bold(),
        instance_ids.join(", "),
    );

    Ok(())
}

pub async fn stop_instances(
    client: &aws_sdk_ec2::Client,
    instance_ids: &[String],
) -> Result<(), Error> {
    client
        .stop_instances()
        .set_instance_ids(Some(instance_ids.to_vec()))
        .send()
        .await
        .map_err(|err| classify(err, "instances"))?;

    println!(
        "{} instance(s): {}",
        console::style("Stopped").green().bold(),
        instance_ids.join(", "),
    );

    Ok(())
}

pub async fn terminate_instances(
    client: &aws_sdk_ec2::Client,
    instance_ids: &[String],
) -> Result<(), Error> {
    client
        .terminate_instances()
        .set_instance_ids(Some(instance_ids.to_vec()))
        .send()
        .await
        .map_err(|err| classify(err, "instances"))?;

    println!(
        "{} instance(s): {}",
        console::style("Terminated").green().bold(),
        instance_ids.join(", "),
    );

    Ok(())
}

/// All instances in the account with their Name tag resolved
pub async fn list_instances(client: &aws_sdk_ec2::Client) -> Result<Vec<InstanceSummary>, Error> {
    let output = client
        .describe_instances()
        .send()
        .await
        .map_err(|err| classify(err, "instances"))?;

    let mut summaries = Vec::new();

    for reservation in output.reservations() {
        for instance in reservation.instances() {
            let name = instance
                .tags()
                .iter()
                .find(|tag| tag.key() == Some("Name"))
                .and_then(|tag| tag.value())
                .map(str::to_string);

            summaries.push(InstanceSummary {
                id: instance.instance_id().unwrap_or_default().to_string(),
                state: instance
                    .state()
                    .and_then(|state| state.name())
                    .map(|name| name.as_str().to_string())
                    .unwrap_or_default(),
                name,
                instance_type: instance
                    .instance_type()
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_default(),
                image_id: instance.image_id().unwrap_or_default().to_string(),
                public_ip: instance.public_ip_address().map(str::to_string),
                private_ip: instance.private_ip_address().map(str::to_string),
            });
        }
    }

    Ok(summaries)
}
