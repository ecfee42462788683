//! Remote store clients: thin signed-REST implementations of
//! [`RemoteStore`] for Azure Blob storage and AWS S3.
//!
//! Both are treated by the pipeline as black boxes with a single `put`; all
//! transport, signing and error handling is encapsulated here. Requests carry
//! hand-built signatures (Shared Key for Azure, SigV4 for S3) so no vendor
//! SDK is needed.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use repovault_core::contract::{DestinationKind, RemoteStore, StoreError};

use crate::settings::{AwsStoreSettings, AzureStoreSettings};

type HmacSha256 = Hmac<Sha256>;

/// Percent-encode each path segment, keeping `/` separators intact. Both
/// providers expect unreserved characters (RFC 3986) to pass through.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>, StoreError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| -> StoreError { format!("invalid HMAC key: {e}").into() })?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

// ---------------------------------------------------------------------------
// Azure Blob storage
// ---------------------------------------------------------------------------

const AZURE_API_VERSION: &str = "2021-08-06";

pub struct AzureBlobStore {
    client: reqwest::Client,
    settings: AzureStoreSettings,
    key: Vec<u8>,
}

impl AzureBlobStore {
    pub fn new(settings: AzureStoreSettings) -> anyhow::Result<Self> {
        let key = BASE64
            .decode(settings.key.as_bytes())
            .map_err(|e| anyhow::anyhow!("AccountKey is not valid base64: {e}"))?;
        Ok(Self {
            client: reqwest::Client::new(),
            settings,
            key,
        })
    }
}

/// Shared Key string-to-sign for a Put Blob request with no Content-Type and
/// no conditional headers. Content-Length is the empty string for empty
/// bodies (API versions since 2015-02-21).
fn azure_string_to_sign(
    content_length: usize,
    date: &str,
    account: &str,
    container: &str,
    encoded_path: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    format!(
        "PUT\n\n\n{length}\n\n\n\n\n\n\n\n\n\
         x-ms-blob-type:BlockBlob\nx-ms-date:{date}\nx-ms-version:{AZURE_API_VERSION}\n\
         /{account}/{container}/{encoded_path}"
    )
}

#[async_trait]
impl RemoteStore for AzureBlobStore {
    fn kind(&self) -> DestinationKind {
        DestinationKind::BlobStore
    }

    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let encoded_path = encode_path(path);
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let string_to_sign = azure_string_to_sign(
            bytes.len(),
            &date,
            &self.settings.account,
            &self.settings.container,
            &encoded_path,
        );
        let signature = BASE64.encode(hmac_sha256(&self.key, &string_to_sign)?);
        let authorization = format!("SharedKey {}:{}", self.settings.account, signature);

        let url = format!(
            "https://{}.blob.{}/{}/{}",
            self.settings.account, self.settings.endpoint_suffix, self.settings.container,
            encoded_path
        );
        debug!(%url, "Putting block blob");
        let response = self
            .client
            .put(&url)
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header("Authorization", authorization)
            .body(bytes)
            .send()
            .await
            .map_err(|e| -> StoreError { format!("azure request failed: {e}").into() })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("azure returned {status}: {body}").into());
        }
        info!(path, "Uploaded to Azure Blob");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AWS S3
// ---------------------------------------------------------------------------

pub struct S3Store {
    client: reqwest::Client,
    settings: AwsStoreSettings,
}

impl S3Store {
    pub fn new(settings: AwsStoreSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }
}

/// SigV4 canonical request for a PUT with host, content hash and date as the
/// signed headers and no query string.
fn s3_canonical_request(
    canonical_uri: &str,
    host: &str,
    payload_hash: &str,
    amz_date: &str,
) -> String {
    format!(
        "PUT\n{canonical_uri}\n\n\
         host:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n\n\
         host;x-amz-content-sha256;x-amz-date\n{payload_hash}"
    )
}

#[async_trait]
impl RemoteStore for S3Store {
    fn kind(&self) -> DestinationKind {
        DestinationKind::ObjectStore
    }

    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let region = &self.settings.region;
        let host = format!("{}.s3.{}.amazonaws.com", self.settings.bucket, region);
        let canonical_uri = format!("/{}", encode_path(path));
        let payload_hash = hex::encode(Sha256::digest(&bytes));

        let canonical_request = s3_canonical_request(&canonical_uri, &host, &payload_hash, &amz_date);
        let scope = format!("{date}/{region}/s3/aws4_request");
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let mut signing_key = hmac_sha256(
            format!("AWS4{}", self.settings.secret_access_key).as_bytes(),
            &date,
        )?;
        signing_key = hmac_sha256(&signing_key, region)?;
        signing_key = hmac_sha256(&signing_key, "s3")?;
        signing_key = hmac_sha256(&signing_key, "aws4_request")?;
        let signature = hex::encode(hmac_sha256(&signing_key, &string_to_sign)?);

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature={signature}",
            self.settings.access_key_id
        );

        let url = format!("https://{host}{canonical_uri}");
        debug!(%url, "Putting S3 object");
        let response = self
            .client
            .put(&url)
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", &payload_hash)
            .header("Authorization", authorization)
            .body(bytes)
            .send()
            .await
            .map_err(|e| -> StoreError { format!("s3 request failed: {e}").into() })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("s3 returned {status}: {body}").into());
        }
        info!(path, "Uploaded to AWS S3");
        Ok(())
    }
}
