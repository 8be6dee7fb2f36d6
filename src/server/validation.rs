//! Upload validation shared by the résumé and job-description controllers
//! (§6.1, §6.4): the MIME allow-list, size cap, and extension derivation.

use axum::extract::multipart::Field;
use axum::http::HeaderMap;

use crate::common::error::{OrchestratorError, OrchestratorResult};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

pub fn is_allowed_mime(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type)
}

/// Original filename extension first, then mime-type mapping, then `.bin`
/// (§6.4 "Extension derivation").
pub fn derive_extension(filename: Option<&str>, mime_type: &str) -> &'static str {
    if let Some(name) = filename {
        if let Some(ext) = name.rsplit('.').next() {
            if name.contains('.') {
                match ext.to_lowercase().as_str() {
                    "pdf" => return ".pdf",
                    "doc" => return ".doc",
                    "docx" => return ".docx",
                    "txt" => return ".txt",
                    _ => {}
                }
            }
        }
    }
    match mime_type {
        "application/pdf" => ".pdf",
        "application/msword" => ".doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => ".docx",
        "text/plain" => ".txt",
        _ => ".bin",
    }
}

/// Reads a multipart field chunk by chunk, rejecting it the moment the
/// running total crosses `MAX_UPLOAD_BYTES` instead of buffering the whole
/// field first (§4.6.1: the cap is enforced while streaming, not after).
pub async fn read_field_capped(field: &mut Field<'_>) -> OrchestratorResult<Vec<u8>> {
    let mut buf = Vec::new();
    while let Some(chunk) =
        field.chunk().await.map_err(|e| OrchestratorError::Upstream(anyhow::anyhow!(e)))?
    {
        if buf.len() + chunk.len() > MAX_UPLOAD_BYTES {
            return Err(OrchestratorError::PayloadTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// True when the request body is JSON rather than `multipart/form-data`
/// (§6.1 scenario 2: `POST /jobs` accepts both).
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_matches_spec_mime_types() {
        assert!(is_allowed_mime("application/pdf"));
        assert!(is_allowed_mime("text/plain"));
        assert!(!is_allowed_mime("image/png"));
    }

    #[test]
    fn extension_prefers_filename_over_mime_type() {
        assert_eq!(derive_extension(Some("resume.pdf"), "text/plain"), ".pdf");
        assert_eq!(derive_extension(Some("resume"), "application/pdf"), ".pdf");
        assert_eq!(derive_extension(None, "application/pdf"), ".pdf");
    }

    #[test]
    fn extension_falls_back_to_bin_for_unknown_mime() {
        assert_eq!(derive_extension(None, "application/octet-stream"), ".bin");
    }

    #[test]
    fn json_content_type_detected_regardless_of_charset_suffix() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());
        assert!(is_json_content_type(&headers));

        let mut multipart_headers = HeaderMap::new();
        multipart_headers.insert(
            axum::http::header::CONTENT_TYPE,
            "multipart/form-data; boundary=X".parse().unwrap(),
        );
        assert!(!is_json_content_type(&multipart_headers));

        assert!(!is_json_content_type(&HeaderMap::new()));
    }
}
