//! Google Drive API request and response types
//!
//! Only the fields the object store needs are modelled.

use serde::{Deserialize, Serialize};

/// Drive folder alias for per-application hidden storage
pub const APP_DATA_FOLDER: &str = "appDataFolder";

/// Google Drive API file resource
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// File ID
    pub id: String,

    /// File name; the object key
    pub name: String,

    /// File size in bytes, as a decimal string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Modification time (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
}

/// Google Drive API files.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,

    /// Token for next page
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Metadata part of a multipart create
#[derive(Debug, Serialize)]
pub struct CreateFileMetadata<'a> {
    pub name: &'a str,
    pub parents: [&'a str; 1],
}

/// Google API error envelope (`{"error": {"code", "message"}}`)
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_file_without_size() {
        let file: DriveFile =
            serde_json::from_str(r#"{"id": "f1", "name": "metadata.json"}"#).unwrap();
        assert_eq!(file.name, "metadata.json");
        assert!(file.size.is_none());
        assert!(file.modified_time.is_none());
    }

    #[test]
    fn test_create_metadata_targets_app_data() {
        let metadata = CreateFileMetadata {
            name: "records/c1.json",
            parents: [APP_DATA_FOLDER],
        };
        assert_eq!(
            serde_json::to_value(&metadata).unwrap(),
            serde_json::json!({"name": "records/c1.json", "parents": ["appDataFolder"]})
        );
    }
}
