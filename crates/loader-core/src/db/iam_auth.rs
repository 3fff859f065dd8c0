use std::time::{Duration, SystemTime};

use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;

/// Builds a short-lived RDS IAM authentication token, used as the Postgres
/// password whenever `DB_PASSWORD` is unset.
///
/// Grounded on the original's `get_db_password`, which calls boto3's
/// `generate_db_auth_token`: that helper is itself just a presigned
/// `https://<host>:<port>/?Action=connect&DBUser=<user>` URL signed with
/// SigV4 for the `rds-db` service, stripped of its scheme. There is no
/// direct equivalent in any AWS Rust SDK crate, so it is reproduced here
/// with `aws-sigv4` directly.
pub async fn generate_auth_token(
    host: &str,
    port: u16,
    user: &str,
    region: &str,
    identity: &Identity,
) -> Result<String, aws_sigv4::http_request::SigningError> {
    let url = format!("https://{host}:{port}/?Action=connect&DBUser={user}");

    let mut settings = SigningSettings::default();
    settings.expires_in = Some(Duration::from_secs(900));
    settings.signature_location = aws_sigv4::http_request::SignatureLocation::QueryParams;

    let signing_params = v4::SigningParams::builder()
        .identity(identity)
        .region(region)
        .name("rds-db")
        .time(SystemTime::now())
        .settings(settings)
        .build()
        .expect("all required signing parameters are set")
        .into();

    let signable_request = SignableRequest::new(
        "GET",
        &url,
        std::iter::empty(),
        SignableBody::Bytes(&[]),
    )?;

    let (instructions, _signature) = sign(signable_request, &signing_params)?.into_parts();

    let mut request = http::Request::builder()
        .uri(&url)
        .body(())
        .expect("static url always builds");
    instructions.apply_to_request_http1x(&mut request);

    Ok(request
        .uri()
        .to_string()
        .trim_start_matches("https://")
        .to_string())
}
