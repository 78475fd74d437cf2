//! Small shared helpers.
//!
//! - [`b64`] — base64 byte strings as they appear in envelope DTOs.

pub mod b64;

pub use b64::Base64Bytes;
