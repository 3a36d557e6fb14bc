use serde::{Deserialize, Serialize};

use crate::serde_utils;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    pub filename: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub object_type: String,
    pub model_version_id: u64,
}

/// Every field is optional on the wire so missing ones surface as handshake errors.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub upload_id: Option<String>,
    pub key: Option<String>,
    pub urls: Option<Vec<PartUrl>>,
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub bucket: String,
    pub key: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub upload_id: String,
    pub parts: Vec<CompletedPartBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedPartBody {
    #[serde(rename = "ETag", serialize_with = "serde_utils::serialize_quoted")]
    pub etag: String,
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateFileRequest {
    pub json: CreateFileBody,
    pub meta: CreateFileMeta,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileBody {
    pub authed: bool,
    pub bucket: String,
    pub key: String,
    pub metadata: FileMetadataBody,
    pub model_version_id: u64,
    pub name: String,
    #[serde(rename = "sizeKB")]
    pub size_kb: f64,
    #[serde(rename = "type")]
    pub object_type: String,
    pub url: String,
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileMetadataBody {
    pub format: String,
    pub fp: String,
    pub size: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateFileMeta {
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl CreateFileMeta {
    /// Marks the metadata fields as client-side `undefined`, matching what the web client sends.
    pub fn undefined_metadata() -> Self {
        let values = ["metadata.format", "metadata.fp", "metadata.size"]
            .into_iter()
            .map(|field| (field.to_string(), serde_json::json!(["undefined"])))
            .collect();
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn init_request_uses_platform_field_names() {
        let request = InitUploadRequest {
            filename: "model.safetensors".into(),
            size: 42,
            object_type: "Model".into(),
            model_version_id: 7,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"filename": "model.safetensors", "size": 42, "type": "Model", "modelVersionId": 7})
        );
    }

    #[test]
    fn init_response_tolerates_missing_fields() {
        let response: InitUploadResponse =
            serde_json::from_value(json!({"uploadId": "u-1", "urls": [{"url": "https://s3/1"}]}))
                .unwrap();
        assert_eq!(response.upload_id.as_deref(), Some("u-1"));
        assert!(response.key.is_none());
        assert_eq!(response.urls.unwrap().len(), 1);
    }

    #[test]
    fn complete_request_quotes_etags() {
        let request = CompleteUploadRequest {
            bucket: "bucket".into(),
            key: "k".into(),
            object_type: "Model".into(),
            upload_id: "u-1".into(),
            parts: vec![CompletedPartBody {
                etag: "abc".into(),
                part_number: 1,
            }],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "bucket": "bucket",
                "key": "k",
                "type": "Model",
                "uploadId": "u-1",
                "parts": [{"ETag": "\"abc\"", "PartNumber": 1}]
            })
        );
    }

    #[test]
    fn create_file_meta_marks_metadata_undefined() {
        let meta = serde_json::to_value(CreateFileMeta::undefined_metadata()).unwrap();
        assert_eq!(
            meta,
            json!({"values": {
                "metadata.format": ["undefined"],
                "metadata.fp": ["undefined"],
                "metadata.size": ["undefined"]
            }})
        );
    }
}
