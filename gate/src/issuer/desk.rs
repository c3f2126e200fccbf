//! The issuing desk: generate codes and export them as a package.

use super::client::{ImageService, IssuerClient};
use super::package::ExportPackage;
use crate::access::{AccessGate, AccessGrant};
use crate::error::IssueError;
use crate::status::StatusBroadcaster;
use crate::types::StatusRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ticket_gate_core::environment::{Clock, SystemClock};

/// Lifecycle of an issued code, as far as the desk knows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
    /// Issued, not known to be redeemed
    Pending,
}

impl fmt::Display for CodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
        }
    }
}

/// A code issued by this desk
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IssuedCode {
    /// Millisecond timestamp of issue, unique within the desk
    pub id: i64,
    /// The code text
    pub code: String,
    /// Where its QR image is rendered
    pub image_url: String,
    /// Lifecycle status
    pub status: CodeStatus,
    /// When it was issued
    pub generated_at: DateTime<Utc>,
}

/// Generates codes and exports them for printing
pub struct IssuingDesk {
    access: AccessGate,
    client: IssuerClient,
    images: ImageService,
    status: StatusBroadcaster,
    clock: Arc<dyn Clock>,
    codes: Vec<IssuedCode>,
}

impl IssuingDesk {
    /// A locked desk with no codes
    #[must_use]
    pub fn new(
        access: AccessGate,
        client: IssuerClient,
        images: ImageService,
        status: StatusBroadcaster,
    ) -> Self {
        Self {
            access,
            client,
            images,
            status,
            clock: Arc::new(SystemClock),
            codes: Vec::new(),
        }
    }

    /// Use `clock` instead of the system clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Offer the access secret
    pub fn verify_secret(&mut self, attempt: &str) -> AccessGrant {
        let grant = self.access.verify(attempt);
        self.status.publish(grant.status_record());
        grant
    }

    /// Whether the desk is unlocked
    #[must_use]
    pub const fn is_unlocked(&self) -> bool {
        self.access.is_unlocked()
    }

    /// Codes issued so far, oldest first
    #[must_use]
    pub fn codes(&self) -> &[IssuedCode] {
        &self.codes
    }

    /// The desk's local status slot
    #[must_use]
    pub fn status(&self) -> Option<StatusRecord> {
        self.status.local()
    }

    /// Issue one new code
    ///
    /// # Errors
    ///
    /// - [`IssueError::Locked`]: the desk has not been unlocked
    /// - [`IssueError::Generate`]: the service did not produce a code
    pub async fn generate(&mut self) -> Result<&IssuedCode, IssueError> {
        if self.access.require_unlocked().is_err() {
            tracing::warn!("Generate refused: access not granted");
            self.status.publish(StatusRecord::error("Please verify password first"));
            return Err(IssueError::Locked);
        }

        let code = match self.client.generate().await {
            Ok(code) => code,
            Err(error) => {
                tracing::warn!(%error, "Code generation failed");
                metrics::counter!("issuer.generate", "result" => "failed").increment(1);
                self.status.publish(StatusRecord::error("Error generating QR code"));
                return Err(error);
            },
        };

        let generated_at = self.clock.now();
        let id = self.next_id(generated_at);
        let image_url = self.images.image_url(&code);
        tracing::info!(id, code = %code, "Code issued");
        metrics::counter!("issuer.generate", "result" => "issued").increment(1);

        self.codes.push(IssuedCode {
            id,
            code,
            image_url,
            status: CodeStatus::Pending,
            generated_at,
        });
        self.status
            .publish(StatusRecord::success("New QR code generated successfully!"));

        let issued = self.codes.len() - 1;
        Ok(&self.codes[issued])
    }

    /// Export every issued code as a package directory under `root`
    ///
    /// All images are downloaded before anything is written, so a failed
    /// download leaves no partial package behind.
    ///
    /// # Errors
    ///
    /// - [`IssueError::ImageDownload`]: an image could not be fetched
    /// - [`IssueError::Io`]: the package could not be written
    pub async fn export(&self, root: &Path) -> Result<PathBuf, IssueError> {
        match self.build_package(root).await {
            Ok(dir) => {
                tracing::info!(dir = %dir.display(), count = self.codes.len(), "Package exported");
                metrics::counter!("issuer.export", "result" => "written").increment(1);
                self.status
                    .publish(StatusRecord::success("All QR codes downloaded successfully!"));
                Ok(dir)
            },
            Err(error) => {
                tracing::warn!(%error, "Package export failed");
                metrics::counter!("issuer.export", "result" => "failed").increment(1);
                self.status.publish(error.export_status());
                Err(error)
            },
        }
    }

    async fn build_package(&self, root: &Path) -> Result<PathBuf, IssueError> {
        let mut images = Vec::with_capacity(self.codes.len());
        for issued in &self.codes {
            let bytes = self.client.fetch_image(&issued.code, &issued.image_url).await?;
            images.push((issued.code.clone(), bytes));
        }

        let package = ExportPackage::new(&self.codes, images, self.clock.now());
        Ok(package.write(root).await?)
    }

    fn next_id(&self, at: DateTime<Utc>) -> i64 {
        let millis = at.timestamp_millis();
        self.codes
            .last()
            .map_or(millis, |last| millis.max(last.id + 1))
    }
}

impl fmt::Debug for IssuingDesk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuingDesk")
            .field("unlocked", &self.access.is_unlocked())
            .field("codes", &self.codes.len())
            .finish_non_exhaustive()
    }
}
