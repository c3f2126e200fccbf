//! Issuing desk.
//!
//! Companion to the scanner: behind its own access gate it asks the remote
//! service for new codes, renders them through a QR image service and
//! exports everything as a printable package.

mod client;
mod desk;
mod package;

pub use client::{ImageService, IssuerClient};
pub use desk::{CodeStatus, IssuedCode, IssuingDesk};
pub use package::{ExportPackage, INDEX_FILE, README_FILE, image_file_name, package_dir_name};
