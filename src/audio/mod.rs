//! # Audio Upload Handling
//!
//! Uploaded clips arrive as multipart fields and are written to a temporary file
//! for the duration of one `/record` request.
//!
//! ## Key Components:
//! - **UploadPolicy**: upload directory, size cap, MP3-only filter
//! - **TempUpload**: owns the temporary file and guarantees it is deleted

pub mod upload;

pub use upload::{TempUpload, UploadPolicy};
