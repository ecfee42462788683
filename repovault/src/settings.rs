/// `settings` module: loads environment-sourced secrets and endpoints into
/// strongly-typed settings structs.
///
/// This is the only place where `std::env` is read. Every loader returns a
/// context-rich `anyhow::Error` so a missing variable names itself at the CLI
/// boundary instead of failing somewhere deep in a client.
///
/// Variables:
/// - provider: `AZURE_DEVOPS_PAT`
/// - Azure Blob: `AZURE_STORAGE_CONNECTION_STRING`, `AZURE_CONTAINER`
/// - AWS S3: `AWS_BUCKET`, `AWS_REGION`, `AWS_ACCESS_KEY_ID`,
///   `AWS_SECRET_ACCESS_KEY`
/// - email: `EMAIL_FROM`, `EMAIL_TO` (comma-separated), `SMTP_SERVER`,
///   `SMTP_PORT` (default 587), `SMTP_USERNAME`, `SMTP_PASSWORD`
use std::env;

use anyhow::{anyhow, bail, Context as _, Result};

/// Personal access token for the source-control provider. Required for every
/// run, including dry runs (discovery is never simulated).
pub fn provider_pat() -> Result<String> {
    env::var("AZURE_DEVOPS_PAT")
        .map_err(|_| anyhow!("AZURE_DEVOPS_PAT is not set; a provider PAT is required"))
}

#[derive(Debug, Clone)]
pub struct AzureStoreSettings {
    pub account: String,
    /// Base64 account key, as carried in the connection string.
    pub key: String,
    pub endpoint_suffix: String,
    pub container: String,
}

pub fn azure_store() -> Result<AzureStoreSettings> {
    let connection_string = env::var("AZURE_STORAGE_CONNECTION_STRING")
        .context("AZURE_STORAGE_CONNECTION_STRING is not set")?;
    let container = env::var("AZURE_CONTAINER").context("AZURE_CONTAINER is not set")?;
    parse_connection_string(&connection_string, container)
}

/// Parse `AccountName=...;AccountKey=...;EndpointSuffix=...` segments.
/// Unknown segments (protocol, SAS, ...) are ignored.
fn parse_connection_string(connection_string: &str, container: String) -> Result<AzureStoreSettings> {
    let mut account = None;
    let mut key = None;
    let mut endpoint_suffix = "core.windows.net".to_string();
    for segment in connection_string.split(';').filter(|s| !s.is_empty()) {
        let (name, value) = segment
            .split_once('=')
            .ok_or_else(|| anyhow!("malformed connection string segment: {segment}"))?;
        match name {
            "AccountName" => account = Some(value.to_string()),
            "AccountKey" => key = Some(value.to_string()),
            "EndpointSuffix" => endpoint_suffix = value.to_string(),
            _ => {}
        }
    }
    Ok(AzureStoreSettings {
        account: account.ok_or_else(|| anyhow!("connection string is missing AccountName"))?,
        key: key.ok_or_else(|| anyhow!("connection string is missing AccountKey"))?,
        endpoint_suffix,
        container,
    })
}

#[derive(Debug, Clone)]
pub struct AwsStoreSettings {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

pub fn aws_store() -> Result<AwsStoreSettings> {
    Ok(AwsStoreSettings {
        bucket: env::var("AWS_BUCKET").context("AWS_BUCKET is not set")?,
        region: env::var("AWS_REGION").context("AWS_REGION is not set")?,
        access_key_id: env::var("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID is not set")?,
        secret_access_key: env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY is not set")?,
    })
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub from: String,
    pub to: Vec<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
}

pub fn email() -> Result<EmailSettings> {
    let from = env::var("EMAIL_FROM").context("EMAIL_FROM is not set")?;
    let to_raw = env::var("EMAIL_TO").context("EMAIL_TO is not set")?;
    let to: Vec<String> = to_raw
        .split(',')
        .map(|recipient| recipient.trim().to_string())
        .filter(|recipient| !recipient.is_empty())
        .collect();
    if to.is_empty() {
        bail!("EMAIL_TO contains no recipients");
    }
    let smtp_host = env::var("SMTP_SERVER").context("SMTP_SERVER is not set")?;
    let smtp_port = match env::var("SMTP_PORT") {
        Ok(raw) => raw
            .parse::<u16>()
            .with_context(|| format!("SMTP_PORT is not a valid port: {raw}"))?,
        Err(_) => 587,
    };
    Ok(EmailSettings {
        from,
        to,
        smtp_host,
        smtp_port,
        smtp_username: env::var("SMTP_USERNAME").ok(),
        smtp_password: env::var("SMTP_PASSWORD").ok(),
    })
}
