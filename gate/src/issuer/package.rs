//! Export package layout.
//!
//! A package is a directory `qr-codes-YYYY-MM-DD/` holding an index CSV, a
//! README and one PNG per code.

use super::desk::IssuedCode;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Index file name
pub const INDEX_FILE: &str = "qr-codes-info.csv";

/// README file name
pub const README_FILE: &str = "README.txt";

const CSV_HEADER: [&str; 5] = ["ID", "Code", "Status", "Generated Date", "File Name"];

/// Directory name for a package generated at `at`
#[must_use]
pub fn package_dir_name(at: DateTime<Utc>) -> String {
    format!("qr-codes-{}", at.format("%Y-%m-%d"))
}

/// File name of a code's image
///
/// Anything other than ASCII letters, digits, `-` and `_` becomes `_` so a
/// code can never escape the package directory.
#[must_use]
pub fn image_file_name(code: &str) -> String {
    let safe: String = code
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("qr-{safe}.png")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// The index CSV for `codes`
#[must_use]
pub fn render_csv(codes: &[IssuedCode]) -> String {
    let mut lines = vec![CSV_HEADER.join(",")];
    lines.extend(codes.iter().map(|code| {
        [
            code.id.to_string(),
            csv_field(&code.code),
            code.status.to_string(),
            code.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            csv_field(&image_file_name(&code.code)),
        ]
        .join(",")
    }));
    lines.join("\n")
}

/// The README for a package of `count` codes generated at `at`
#[must_use]
pub fn render_readme(count: usize, at: DateTime<Utc>) -> String {
    format!(
        "QR Codes Package\n\
         Generated on: {}\n\
         \n\
         This package contains:\n\
         1. {INDEX_FILE} - Information about all QR codes\n\
         2. Individual QR code PNG files\n\
         \n\
         Each QR code file is named in the format: qr-{{CODE}}.png\n\
         For example: qr-ABC123.png\n\
         \n\
         Total QR codes in this package: {count}\n",
        at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// A fully assembled package, ready to write
#[derive(Debug, Clone)]
pub struct ExportPackage {
    dir_name: String,
    index: String,
    readme: String,
    images: Vec<(String, Vec<u8>)>,
}

impl ExportPackage {
    /// Assemble a package from codes and their downloaded images
    ///
    /// `images` pairs each code with its PNG bytes.
    #[must_use]
    pub fn new(codes: &[IssuedCode], images: Vec<(String, Vec<u8>)>, at: DateTime<Utc>) -> Self {
        Self {
            dir_name: package_dir_name(at),
            index: render_csv(codes),
            readme: render_readme(codes.len(), at),
            images: images
                .into_iter()
                .map(|(code, bytes)| (image_file_name(&code), bytes))
                .collect(),
        }
    }

    /// Directory name the package is written to
    #[must_use]
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    /// Write the package under `root`, returning the package directory
    ///
    /// # Errors
    ///
    /// Returns any I/O error from creating the directory or writing a file.
    pub async fn write(self, root: &Path) -> std::io::Result<PathBuf> {
        let dir = root.join(&self.dir_name);
        tokio::fs::create_dir_all(&dir).await?;

        tokio::fs::write(dir.join(INDEX_FILE), self.index).await?;
        tokio::fs::write(dir.join(README_FILE), self.readme).await?;
        for (file_name, bytes) in self.images {
            tokio::fs::write(dir.join(file_name), bytes).await?;
        }

        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use crate::issuer::desk::CodeStatus;
    use ticket_gate_testing::test_epoch;

    fn issued(id: i64, code: &str) -> IssuedCode {
        IssuedCode {
            id,
            code: code.to_string(),
            image_url: format!("http://images.local/?data={code}"),
            status: CodeStatus::Pending,
            generated_at: test_epoch(),
        }
    }

    #[test]
    fn test_dir_name_uses_date() {
        assert_eq!(package_dir_name(test_epoch()), "qr-codes-2025-01-01");
    }

    #[test]
    fn test_image_file_name_is_path_safe() {
        assert_eq!(image_file_name("ABC123"), "qr-ABC123.png");
        assert_eq!(image_file_name("../etc/x"), "qr-___etc_x.png");
    }

    #[test]
    fn test_csv_rows() {
        let csv = render_csv(&[issued(1_735_689_600_000, "ABC123"), issued(2, "X,Y")]);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "ID,Code,Status,Generated Date,File Name");
        assert_eq!(
            lines[1],
            "1735689600000,ABC123,pending,2025-01-01 00:00:00 UTC,qr-ABC123.png"
        );
        assert_eq!(
            lines[2],
            "2,\"X,Y\",pending,2025-01-01 00:00:00 UTC,qr-X_Y.png"
        );
    }

    #[test]
    fn test_readme_mentions_count() {
        let readme = render_readme(3, test_epoch());
        assert!(readme.starts_with("QR Codes Package\nGenerated on: 2025-01-01 00:00:00 UTC\n"));
        assert!(readme.contains("qr-{CODE}.png"));
        assert!(readme.contains("Total QR codes in this package: 3"));
    }

    #[tokio::test]
    async fn test_write_lays_out_directory() {
        let root = tempfile::tempdir().unwrap();
        let codes = [issued(1, "ABC123")];
        let package = ExportPackage::new(
            &codes,
            vec![("ABC123".to_string(), vec![0x89, b'P', b'N', b'G'])],
            test_epoch(),
        );

        let dir = package.write(root.path()).await.unwrap();

        assert_eq!(dir, root.path().join("qr-codes-2025-01-01"));
        assert!(dir.join(INDEX_FILE).is_file());
        assert!(dir.join(README_FILE).is_file());
        assert_eq!(
            std::fs::read(dir.join("qr-ABC123.png")).unwrap(),
            vec![0x89, b'P', b'N', b'G']
        );
    }
}
