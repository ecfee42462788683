//! Email notifier: composes the run summary into a MIME message with the
//! manifest attached and submits it over SMTP.
//!
//! Construction never fails: missing email settings surface as a
//! `NotConfigured` error at send time, keeping notification strictly
//! best-effort. The SMTP exchange is a plain submission (EHLO, optional AUTH
//! LOGIN, MAIL FROM, RCPT TO, DATA) intended for internal relays.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{info, warn};

use repovault_core::contract::{Notifier, NotifyError};
use repovault_core::manifest::Manifest;
use repovault_core::notify::{compose_body, compose_subject, RunSummary};

use crate::settings::{self, EmailSettings};

pub struct EmailNotifier {
    settings: Option<EmailSettings>,
}

impl EmailNotifier {
    /// Build from environment; incomplete settings degrade to a notifier
    /// that reports `NotConfigured` instead of failing the run.
    pub fn from_env() -> Self {
        match settings::email() {
            Ok(settings) => Self {
                settings: Some(settings),
            },
            Err(e) => {
                warn!(error = %e, "Email notification not configured");
                Self { settings: None }
            }
        }
    }

    pub fn new(settings: EmailSettings) -> Self {
        Self {
            settings: Some(settings),
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, summary: &RunSummary, manifest: &Manifest) -> Result<(), NotifyError> {
        let Some(settings) = &self.settings else {
            return Err(NotifyError::NotConfigured(
                "EMAIL_FROM, EMAIL_TO and SMTP_SERVER must all be set".to_string(),
            ));
        };
        let message = build_message(settings, summary, manifest)
            .map_err(|e| NotifyError::Delivery(format!("could not compose message: {e}")))?;
        send_smtp(settings, &message).await?;
        info!(recipients = settings.to.len(), "Notification email sent");
        Ok(())
    }
}

/// Compose the full RFC 5322 message: plain-text summary plus the manifest
/// JSON as a base64 attachment.
fn build_message(
    settings: &EmailSettings,
    summary: &RunSummary,
    manifest: &Manifest,
) -> serde_json::Result<String> {
    let subject = compose_subject(summary);
    let body = compose_body(summary);
    let attachment_name = format!("manifest-{}.json", summary.timestamp);
    let manifest_json = manifest.to_json_pretty()?;
    let boundary = format!("=_repovault_{}", summary.timestamp);

    let mut message = String::new();
    message.push_str(&format!("From: {}\r\n", settings.from));
    message.push_str(&format!("To: {}\r\n", settings.to.join(", ")));
    message.push_str(&format!("Subject: {subject}\r\n"));
    message.push_str(&format!("Date: {}\r\n", Utc::now().to_rfc2822()));
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\r\n"
    ));

    message.push_str(&format!("--{boundary}\r\n"));
    message.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
    message.push_str(&body.replace('\n', "\r\n"));
    message.push_str("\r\n");

    message.push_str(&format!("--{boundary}\r\n"));
    message.push_str(&format!(
        "Content-Type: application/json; name=\"{attachment_name}\"\r\n"
    ));
    message.push_str(&format!(
        "Content-Disposition: attachment; filename=\"{attachment_name}\"\r\n"
    ));
    message.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
    let encoded = BASE64.encode(manifest_json.as_bytes());
    for chunk in encoded.as_bytes().chunks(76) {
        message.push_str(&String::from_utf8_lossy(chunk));
        message.push_str("\r\n");
    }
    message.push_str(&format!("--{boundary}--\r\n"));
    Ok(message)
}

/// Escape lines starting with '.' per the SMTP DATA transparency rules.
fn dot_stuff(message: &str) -> String {
    let stuffed = message.replace("\r\n.", "\r\n..");
    if stuffed.starts_with('.') {
        format!(".{stuffed}")
    } else {
        stuffed
    }
}

/// Parse one SMTP reply line into (code, is_final).
fn parse_reply_line(line: &str) -> Option<(u16, bool)> {
    if line.len() < 3 {
        return None;
    }
    let code = line.get(..3)?.parse::<u16>().ok()?;
    let is_final = line.as_bytes().get(3) != Some(&b'-');
    Some((code, is_final))
}

// No logging here: AUTH LOGIN payloads pass through as base64 credentials.
async fn send_command(writer: &mut OwnedWriteHalf, line: &str) -> Result<(), NotifyError> {
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| NotifyError::Delivery(format!("smtp write failed: {e}")))?;
    writer
        .write_all(b"\r\n")
        .await
        .map_err(|e| NotifyError::Delivery(format!("smtp write failed: {e}")))
}

/// Read a (possibly multiline) reply and require the given code.
async fn expect_reply(
    reader: &mut BufReader<OwnedReadHalf>,
    expected: u16,
) -> Result<(), NotifyError> {
    loop {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| NotifyError::Delivery(format!("smtp read failed: {e}")))?;
        if read == 0 {
            return Err(NotifyError::Delivery(
                "smtp server closed the connection".to_string(),
            ));
        }
        let trimmed = line.trim_end();
        let Some((code, is_final)) = parse_reply_line(trimmed) else {
            return Err(NotifyError::Delivery(format!(
                "unparseable smtp reply: {trimmed}"
            )));
        };
        if !is_final {
            continue;
        }
        if code != expected {
            return Err(NotifyError::Delivery(format!(
                "expected {expected}, got: {trimmed}"
            )));
        }
        return Ok(());
    }
}

async fn send_smtp(settings: &EmailSettings, message: &str) -> Result<(), NotifyError> {
    let address = format!("{}:{}", settings.smtp_host, settings.smtp_port);
    info!(%address, "Connecting to SMTP server");
    let stream = TcpStream::connect(&address)
        .await
        .map_err(|e| NotifyError::Delivery(format!("connect {address}: {e}")))?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    expect_reply(&mut reader, 220).await?;
    send_command(&mut writer, "EHLO repovault").await?;
    expect_reply(&mut reader, 250).await?;

    if let (Some(username), Some(password)) = (&settings.smtp_username, &settings.smtp_password) {
        send_command(&mut writer, "AUTH LOGIN").await?;
        expect_reply(&mut reader, 334).await?;
        send_command(&mut writer, &BASE64.encode(username.as_bytes())).await?;
        expect_reply(&mut reader, 334).await?;
        send_command(&mut writer, &BASE64.encode(password.as_bytes())).await?;
        expect_reply(&mut reader, 235).await?;
    }

    send_command(&mut writer, &format!("MAIL FROM:<{}>", settings.from)).await?;
    expect_reply(&mut reader, 250).await?;
    for recipient in &settings.to {
        send_command(&mut writer, &format!("RCPT TO:<{recipient}>")).await?;
        expect_reply(&mut reader, 250).await?;
    }

    send_command(&mut writer, "DATA").await?;
    expect_reply(&mut reader, 354).await?;
    writer
        .write_all(dot_stuff(message).as_bytes())
        .await
        .map_err(|e| NotifyError::Delivery(format!("smtp write failed: {e}")))?;
    writer
        .write_all(b"\r\n.\r\n")
        .await
        .map_err(|e| NotifyError::Delivery(format!("smtp write failed: {e}")))?;
    expect_reply(&mut reader, 250).await?;

    send_command(&mut writer, "QUIT").await?;
    // Some servers close without a goodbye; that is not a delivery failure.
    let _ = expect_reply(&mut reader, 221).await;
    Ok(())
}
