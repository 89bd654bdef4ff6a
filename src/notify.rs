//! Shutdown notification: emails collected output files via SMTP.

use std::path::{Path, PathBuf};

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::SmtpConfig;
use crate::error::NotifyError;
use crate::record::queue_name;

/// Base subject; the per-file queue name is appended.
const SUBJECT: &str =
    "Life Expectancy/GDP by Countries - Greater than 2020 Average - Data Export";

/// Static notification body.
const BODY: &str =
    "The consumer has been interrupted. Attached are the CSV files with the data gathered so far.";

/// Sends one email per collected output file, each with that file attached.
pub struct Notifier {
    config: SmtpConfig,
}

impl Notifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Email every CSV file in the output directory, one message per file.
    ///
    /// Deliveries are independent: a failure for one file is logged and the
    /// remaining files are still sent. Returns the number sent.
    pub fn send_exports(&self, output_dir: &Path) -> Result<usize, NotifyError> {
        let files = collect_output_files(output_dir)?;
        if files.is_empty() {
            tracing::info!("No CSV files found in the output directory to send");
            return Ok(0);
        }

        let mut sent = 0;
        for file in &files {
            match self.send_export(file) {
                Ok(()) => {
                    tracing::info!(file = %file.display(), "Email sent with attachment");
                    sent += 1;
                }
                Err(e) => {
                    tracing::error!(file = %file.display(), error = %e, "Failed to send email");
                }
            }
        }
        Ok(sent)
    }

    /// Send one notification with the given file attached.
    pub fn send_export(&self, path: &Path) -> Result<(), NotifyError> {
        let message = self.build_message(path)?;
        let transport = self.transport()?;
        transport
            .send(&message)
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        tracing::info!(to = %self.config.to_address, "Email sent");
        Ok(())
    }

    fn transport(&self) -> Result<SmtpTransport, NotifyError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );
        Ok(SmtpTransport::starttls_relay(&self.config.host)
            .map_err(|e| NotifyError::Smtp(e.to_string()))?
            .port(self.config.port)
            .credentials(creds)
            .build())
    }

    /// Build the notification message for one output file. The subject
    /// carries the queue name derived from the file's region.
    fn build_message(&self, path: &Path) -> Result<Message, NotifyError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("export.csv")
            .to_string();
        let region = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown");
        let queue = queue_name(region);

        let contents = std::fs::read(path).map_err(|source| NotifyError::Attachment {
            attachment: filename.clone(),
            source,
        })?;

        let from: Mailbox =
            self.config
                .from_address
                .parse()
                .map_err(|e: lettre::address::AddressError| NotifyError::InvalidAddress {
                    address: self.config.from_address.clone(),
                    reason: e.to_string(),
                })?;
        let to: Mailbox =
            self.config
                .to_address
                .parse()
                .map_err(|e: lettre::address::AddressError| NotifyError::InvalidAddress {
                    address: self.config.to_address.clone(),
                    reason: e.to_string(),
                })?;

        let content_type =
            ContentType::parse("text/csv").map_err(|e| NotifyError::Build {
                attachment: filename.clone(),
                reason: e.to_string(),
            })?;
        let attachment = Attachment::new(filename.clone()).body(contents, content_type);

        Message::builder()
            .from(from)
            .to(to)
            .subject(format!("{SUBJECT} - {queue}"))
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(BODY.to_string()))
                    .singlepart(attachment),
            )
            .map_err(|e| NotifyError::Build {
                attachment: filename,
                reason: e.to_string(),
            })
    }
}

/// Every CSV file in the output directory, sorted by path.
pub fn collect_output_files(dir: &Path) -> Result<Vec<PathBuf>, NotifyError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();
    Ok(files)
}

// ── Tests ───────────────────────────────────────────────────────────
