//! Simulated OCR
//!
//! Accepts one uploaded document under `document` or `file`. Plain text files
//! are "recognized" by decoding them; images and PDFs yield a placeholder
//! transcript. The content type is sniffed from the file bytes when possible.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::plugins::PluginEntry;
use crate::strategy::{ModelStrategy, StrategyError, creator};
use crate::types::{InvocationInput, ModelOutput, OutputMetadata, ProcessContext, UploadedFile};
use crate::upload::{DEFAULT_MAX_FILE_SIZE, UPLOAD_EXTENSION};

/// Model id of the OCR strategy.
pub const MODEL_ID: &str = "ocr";

const MODEL_VERSION: &str = "sim-ocr-1";
const FILE_FIELDS: &[&str] = &["document", "file"];
const ACCEPTED_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/tiff",
    "image/webp",
    "image/bmp",
    "application/pdf",
    "text/plain",
];

/// Input contract. The upload marker makes the gate parse multipart bodies.
pub fn input_schema() -> Value {
    let file_field = json!({
        "type": "object",
        "required": ["originalname", "mimetype", "size"],
        (UPLOAD_EXTENSION): { "mimeTypes": ACCEPTED_TYPES, "maxSize": DEFAULT_MAX_FILE_SIZE }
    });
    json!({
        "type": "object",
        "properties": {
            "document": file_field,
            "file": file_field,
            "language": { "type": "string", "enum": ["auto", "en", "de", "fr", "es"] }
        },
        "anyOf": [
            { "required": ["document"] },
            { "required": ["file"] }
        ]
    })
}

/// Registration table row.
pub fn entry() -> PluginEntry {
    PluginEntry::new(MODEL_ID, input_schema(), creator(OcrStrategy::default))
}

/// Simulated text recognition.
#[derive(Debug, Default)]
pub struct OcrStrategy;

impl OcrStrategy {
    fn recognize(file: &UploadedFile) -> Result<(String, f64, String), StrategyError> {
        let sniffed = infer::get(&file.buffer).map(|kind| kind.mime_type().to_string());
        let mime = sniffed.unwrap_or_else(|| file.mimetype.clone());

        if mime == "text/plain" {
            let text = std::str::from_utf8(&file.buffer).map_err(|_| {
                StrategyError::InvalidInput(format!(
                    "'{}' is not valid UTF-8 text",
                    file.originalname
                ))
            })?;
            return Ok((text.trim().to_string(), 1.0, mime));
        }
        if !ACCEPTED_TYPES.contains(&mime.as_str()) {
            return Err(StrategyError::InvalidInput(format!(
                "'{}' looks like {mime}, which cannot be recognized",
                file.originalname
            )));
        }
        Ok((
            format!(
                "[simulated transcript of {} ({} bytes)]",
                file.originalname, file.size
            ),
            0.87,
            mime,
        ))
    }
}

#[async_trait]
impl ModelStrategy for OcrStrategy {
    async fn process(
        &mut self,
        input: InvocationInput,
        _context: ProcessContext,
    ) -> Result<ModelOutput, StrategyError> {
        let started = Instant::now();
        let file = input.first_file(FILE_FIELDS).ok_or_else(|| {
            StrategyError::InvalidInput("A document file is required".to_string())
        })?;
        let language = input.str_field("language").unwrap_or("auto");
        let (text, confidence, mime) = Self::recognize(file)?;

        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(ModelOutput::new(json!({
            "text": text,
            "confidence": confidence,
            "mimeType": mime,
            "language": language,
            "pages": 1,
        }))
        .with_metadata(
            OutputMetadata::new(MODEL_VERSION, "simulated")
                .with_processing_time(elapsed)
                .with_extra("fileName", file.originalname.clone())
                .with_extra("fileSize", file.size),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{UploadDeclaration, UploadPolicy, resolve_upload_policy};
    use axum::body::Bytes;

    fn upload(field: &str, name: &str, mime: &str, bytes: &'static [u8]) -> UploadedFile {
        UploadedFile {
            fieldname: field.into(),
            originalname: name.into(),
            encoding: "7bit".into(),
            mimetype: mime.into(),
            size: bytes.len(),
            buffer: Bytes::from_static(bytes),
            path: None,
        }
    }

    #[test]
    fn schema_enables_uploads_through_marker() {
        let policy = resolve_upload_policy(
            &input_schema(),
            &UploadDeclaration::Infer,
            &UploadPolicy::default(),
        )
        .unwrap();
        assert!(policy.allows("application/pdf"));
        assert!(!policy.allows("image/gif"));
    }

    #[tokio::test]
    async fn text_files_are_decoded() {
        let input = InvocationInput::default()
            .with_uploads(vec![upload("document", "note.txt", "text/plain", b"hello ocr\n")]);
        let output = OcrStrategy
            .process(input, ProcessContext::default())
            .await
            .unwrap();
        assert_eq!(output.result["text"], json!("hello ocr"));
        assert_eq!(output.result["confidence"], json!(1.0));
    }

    #[tokio::test]
    async fn png_bytes_are_sniffed() {
        const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        let input = InvocationInput::default()
            .with_uploads(vec![upload("file", "scan.bin", "application/octet-stream", PNG)]);
        let output = OcrStrategy
            .process(input, ProcessContext::default())
            .await
            .unwrap();
        assert_eq!(output.result["mimeType"], json!("image/png"));
        assert!(output.result["text"].as_str().unwrap().contains("scan.bin"));
    }

    #[tokio::test]
    async fn missing_file_is_invalid_input() {
        let err = OcrStrategy
            .process(InvocationInput::default(), ProcessContext::default())
            .await
            .unwrap_err();
        assert_eq!(err, StrategyError::InvalidInput("A document file is required".into()));
    }
}
