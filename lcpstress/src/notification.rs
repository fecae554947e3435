//! Encryption notification payloads.
//!
//! An encryption tool tells the license server about a freshly protected publication by
//! PUTting an [`EncryptionNotification`] to `/contents/<content-id>`. The server answers
//! failures with an RFC 7807 style [`Problem`] body.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PayloadConfig;
use crate::error::{Result, StressError};

/// Storage mode telling the server the package already sits on external storage.
pub const STORAGE_MODE_EXTERNAL: i32 = 2;

/// Notification body sent for every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNotification {
    #[serde(rename = "content-id")]
    pub content_id: String,
    /// Raw content key, carried as standard base64 text on the wire
    #[serde(rename = "content-encryption-key", with = "base64_bytes")]
    pub content_key: Vec<u8>,
    #[serde(rename = "storage-mode")]
    pub storage_mode: i32,
    #[serde(rename = "protected-content-location")]
    pub output: String,
    #[serde(rename = "protected-content-disposition")]
    pub file_name: String,
    #[serde(rename = "protected-content-length")]
    pub size: i64,
    #[serde(rename = "protected-content-sha256")]
    pub checksum: String,
    #[serde(
        rename = "protected-content-type",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub content_type: String,
}

impl EncryptionNotification {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(StressError::Serialization)
    }
}

/// Structured error body returned by the license server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Mirrors the HTTP status when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl Problem {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(StressError::ResponseParse)
    }

    /// The human readable detail, empty when the server sent none.
    pub fn detail(&self) -> &str {
        self.detail.as_deref().unwrap_or_default()
    }
}

/// Builds one synthetic notification per call.
#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    payload: PayloadConfig,
    key_size: usize,
}

impl NotificationBuilder {
    pub fn new(payload: PayloadConfig, key_size: usize) -> Self {
        Self { payload, key_size }
    }

    /// File name derived from the firing time, e.g. `test-2024-05-02T10:11:12.123456789Z.epub`.
    pub fn file_name(&self, fired_at: DateTime<Utc>) -> String {
        format!(
            "{}{}.epub",
            self.payload.file_prefix,
            fired_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
        )
    }

    pub fn build(&self, content_id: Uuid, fired_at: DateTime<Utc>) -> Result<EncryptionNotification> {
        let content_key = generate_key(self.key_size)?;
        let file_name = self.file_name(fired_at);

        Ok(EncryptionNotification {
            content_id: content_id.to_string(),
            content_key,
            storage_mode: STORAGE_MODE_EXTERNAL,
            output: format!("{}{}", self.payload.output_base_url, file_name),
            file_name,
            size: self.payload.size,
            checksum: self.payload.checksum.clone(),
            content_type: self.payload.content_type.clone(),
        })
    }
}

/// Draw `size` bytes from the operating system's CSPRNG.
pub fn generate_key(size: usize) -> Result<Vec<u8>> {
    let mut key = vec![0u8; size];
    OsRng.try_fill_bytes(&mut key)?;
    Ok(key)
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fired_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 10, 11, 12).unwrap() + chrono::Duration::nanoseconds(123_456_789)
    }

    #[test]
    fn test_build_populates_every_field() {
        let builder = NotificationBuilder::new(PayloadConfig::default(), 16);
        let content_id = Uuid::new_v4();

        let notification = builder.build(content_id, fired_at()).unwrap();

        assert_eq!(notification.content_id, content_id.to_string());
        assert_eq!(notification.content_key.len(), 16);
        assert_eq!(notification.storage_mode, STORAGE_MODE_EXTERNAL);
        assert_eq!(notification.file_name, "test-2024-05-02T10:11:12.123456789Z.epub");
        assert_eq!(
            notification.output,
            "http://edrlab.org/encrypted/test-2024-05-02T10:11:12.123456789Z.epub"
        );
        assert_eq!(notification.size, 65_348_042);
        assert_eq!(notification.content_type, "application/epub+zip");
    }

    #[test]
    fn test_keys_differ_between_builds() {
        let builder = NotificationBuilder::new(PayloadConfig::default(), 32);
        let first = builder.build(Uuid::new_v4(), fired_at()).unwrap();
        let second = builder.build(Uuid::new_v4(), fired_at()).unwrap();

        assert_eq!(first.content_key.len(), 32);
        assert_ne!(first.content_key, second.content_key);
    }

    #[test]
    fn test_wire_format_round_trip() {
        let builder = NotificationBuilder::new(PayloadConfig::default(), 16);
        let notification = builder.build(Uuid::new_v4(), fired_at()).unwrap();

        let body = notification.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["storage-mode"], 2);
        assert_eq!(value["protected-content-length"], 65_348_042);
        assert!(value["content-encryption-key"].is_string());
        assert_eq!(value["protected-content-type"], "application/epub+zip");

        let decoded: EncryptionNotification = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded, notification);
    }

    #[test]
    fn test_empty_content_type_is_omitted() {
        let payload = PayloadConfig {
            content_type: String::new(),
            ..Default::default()
        };
        let notification = NotificationBuilder::new(payload, 16)
            .build(Uuid::new_v4(), fired_at())
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&notification.to_json().unwrap()).unwrap();
        assert!(value.get("protected-content-type").is_none());

        let decoded: EncryptionNotification = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.content_type, "");
    }

    #[test]
    fn test_key_bytes_encoded_as_base64() {
        let notification = EncryptionNotification {
            content_id: "id".to_string(),
            content_key: vec![0xde, 0xad, 0xbe, 0xef],
            storage_mode: STORAGE_MODE_EXTERNAL,
            output: String::new(),
            file_name: String::new(),
            size: 0,
            checksum: String::new(),
            content_type: String::new(),
        };
        let value: serde_json::Value = serde_json::from_slice(&notification.to_json().unwrap()).unwrap();
        assert_eq!(value["content-encryption-key"], "3q2+7w==");
    }

    #[test]
    fn test_problem_parse() {
        let problem = Problem::parse(
            r#"{"type":"about:blank","title":"Service Unavailable","status":503,"detail":"overloaded"}"#,
        )
        .unwrap();
        assert_eq!(problem.kind.as_deref(), Some("about:blank"));
        assert_eq!(problem.status, Some(503));
        assert_eq!(problem.detail(), "overloaded");

        let sparse = Problem::parse(r#"{"detail":"overloaded"}"#).unwrap();
        assert_eq!(sparse.detail(), "overloaded");
        assert_eq!(sparse.title, None);
    }

    #[test]
    fn test_problem_parse_rejects_garbage() {
        assert!(matches!(Problem::parse(""), Err(StressError::ResponseParse(_))));
        assert!(matches!(Problem::parse("<html>502</html>"), Err(StressError::ResponseParse(_))));
        assert_eq!(Problem::default().detail(), "");
    }
}
