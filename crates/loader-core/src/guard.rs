use std::time::SystemTime;

use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::config::Config;
use crate::error::{LoaderError, LoaderResult};

#[derive(Debug, Deserialize)]
struct ListTasksResponse {
    #[serde(rename = "taskArns")]
    task_arns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeTasksResponse {
    tasks: Vec<EcsTask>,
}

#[derive(Debug, Deserialize)]
struct EcsTask {
    group: String,
}

/// Guards against two copies of the same ECS task group running in the
/// same cluster concurrently, which would double-apply CDC batches against
/// the same table. No-op outside AWS, since local/dev runs have no ECS
/// cluster to check.
///
/// Grounded on `aws.check_for_parallel_tasks`. Reimplemented as raw signed
/// requests against the ECS JSON API (`AmazonEC2ContainerServiceV20141113`)
/// rather than pulling in `aws-sdk-ecs`: the teacher's workspace already
/// carries `aws-sigv4` for RDS IAM token minting, and two API calls don't
/// justify a whole additional service SDK crate.
#[instrument(skip(config))]
pub async fn check_for_parallel_tasks(config: &Config) -> LoaderResult<()> {
    if !config.running_in_aws() {
        return Ok(());
    }

    let cluster = config
        .ecs_cluster
        .clone()
        .ok_or_else(|| LoaderError::EnvValidation(vec!["ECS_CLUSTER".to_string()]))?;
    let task_group = config
        .ecs_task_group
        .clone()
        .ok_or_else(|| LoaderError::EnvValidation(vec!["ECS_TASK_GROUP".to_string()]))?;

    let region = config
        .db_region
        .clone()
        .ok_or_else(|| LoaderError::EnvValidation(vec!["DB_REGION".to_string()]))?;

    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let identity = sdk_config
        .credentials_provider()
        .ok_or_else(|| LoaderError::EnvValidation(vec!["AWS credentials".to_string()]))?
        .provide_credentials()
        .await
        .map_err(|e| LoaderError::TransientTransport(Box::new(e)))?
        .into();

    let client = reqwest::Client::new();

    let list_body = json!({ "cluster": cluster }).to_string();
    let list_response: ListTasksResponse = ecs_call(
        &client,
        &region,
        &identity,
        "AmazonEC2ContainerServiceV20141113.ListTasks",
        &list_body,
    )
    .await?;

    if list_response.task_arns.is_empty() {
        return Ok(());
    }

    let describe_body = json!({ "cluster": cluster, "tasks": list_response.task_arns }).to_string();
    let describe_response: DescribeTasksResponse = ecs_call(
        &client,
        &region,
        &identity,
        "AmazonEC2ContainerServiceV20141113.DescribeTasks",
        &describe_body,
    )
    .await?;

    let match_count = describe_response
        .tasks
        .iter()
        .filter(|task| task.group == task_group)
        .count();

    if match_count > 1 {
        return Err(LoaderError::ParallelInstance {
            cluster,
            match_count,
        });
    }

    Ok(())
}

async fn ecs_call<T: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    region: &str,
    identity: &aws_smithy_runtime_api::client::identity::Identity,
    target: &str,
    body: &str,
) -> LoaderResult<T> {
    let url = format!("https://ecs.{region}.amazonaws.com/");

    let signing_params: aws_sigv4::sign::v4::SigningParams = v4::SigningParams::builder()
        .identity(identity)
        .region(region)
        .name("ecs")
        .time(SystemTime::now())
        .settings(SigningSettings::default())
        .build()
        .expect("all required signing parameters are set")
        .into();

    let headers = [
        ("content-type", "application/x-amz-json-1.1"),
        ("x-amz-target", target),
    ];
    let signable_request = SignableRequest::new(
        "POST",
        &url,
        headers.iter().copied(),
        SignableBody::Bytes(body.as_bytes()),
    )
    .map_err(|e| LoaderError::TransientTransport(Box::new(e)))?;

    let (instructions, _signature) = sign(signable_request, &signing_params)
        .map_err(|e| LoaderError::TransientTransport(Box::new(e)))?
        .into_parts();

    let mut request = client.post(&url).body(body.to_string());
    for (name, value) in &headers {
        request = request.header(*name, *value);
    }
    for header in instructions.headers() {
        request = request.header(header.0, header.1);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(LoaderError::TransientTransport(
            format!("ECS API call {target} failed with {status}: {text}").into(),
        ));
    }

    Ok(response.json().await?)
}
