//! Form decoding for upload rules.
//!
//! The engine delegates form decoding to a [`FormDecoder`]. The built-in
//! [`UrlEncodedFormDecoder`] only understands `application/x-www-form-urlencoded`
//! bodies; applications accepting `multipart/form-data` plug in their own decoder, which
//! stores file parts under the upload directory and reports them as [`UploadedFile`]s.

use crate::body::OptionReqBody;
use crate::error::EngineError;
use async_trait::async_trait;
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// A file part written to disk by a [`FormDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Name of the form field carrying the file.
    pub field: String,
    /// File name sent by the client.
    pub file_name: String,
    pub content_type: Option<String>,
    /// Where the content was stored.
    pub path: PathBuf,
    pub size: u64,
}

/// Decoded form: plain fields plus file parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    pub fields: Map<String, Value>,
    pub files: Vec<UploadedFile>,
}

#[async_trait]
pub trait FormDecoder: Send + Sync {
    /// Consumes `body` and decodes it, writing file parts below `upload_dir`.
    async fn decode(&self, headers: &HeaderMap, body: &OptionReqBody, upload_dir: &Path) -> Result<FormData, EngineError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UrlEncodedFormDecoder;

#[async_trait]
impl FormDecoder for UrlEncodedFormDecoder {
    async fn decode(&self, headers: &HeaderMap, body: &OptionReqBody, _upload_dir: &Path) -> Result<FormData, EngineError> {
        let content_type = headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok()).unwrap_or_default();
        let mime: mime::Mime = content_type.parse().map_err(|e| EngineError::form(format!("invalid content type '{content_type}': {e}")))?;
        if mime.essence_str() != mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            return Err(EngineError::form(format!("unsupported content type '{content_type}'")));
        }

        let bytes = body.collect().await?;
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes).map_err(EngineError::form)?;
        Ok(FormData { fields: pairs_to_map(pairs), files: Vec::new() })
    }
}

/// Folds decoded pairs into a JSON object, the last value of a repeated name wins.
pub(crate) fn pairs_to_map(pairs: Vec<(String, String)>) -> Map<String, Value> {
    pairs.into_iter().map(|(name, value)| (name, Value::String(value))).collect()
}
