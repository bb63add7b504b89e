//! Wire-level event types exchanged over the endpoint event channel.
//!
//! Direct precedent in the pack for a `type`-tagged JSON envelope over a
//! bidirectional socket (the retrieval pack's `rt-protocol` crate tags
//! forwarder/receiver messages with a `kind` field the same way). Field
//! names follow the external interface's camelCase wire vocabulary even
//! though the Rust identifiers are snake_case.

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

/// A file size that serializes as a JSON string (64-bit precision is not
/// safe to round-trip through a JSON number in a browser) but deserializes
/// from either a string or a number, since senders may submit either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileSize(pub u64);

impl Serialize for FileSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for FileSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(FileSize(n)),
            Repr::Text(s) => s
                .parse()
                .map(FileSize)
                .map_err(|_| D::Error::custom("fileSize is not a valid integer")),
        }
    }
}

/// Events accepted from an endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundEvent {
    /// Begin a new transfer session.
    UploadInit {
        #[serde(rename = "fileName")]
        file_name: String,
        #[serde(rename = "fileSize")]
        file_size: FileSize,
        #[serde(rename = "fileType")]
        file_type: String,
        #[serde(rename = "fileHash", default)]
        file_hash: Option<String>,
    },
    /// Join an existing session's room by presenting its code.
    JoinRoom {
        #[serde(rename = "fileId")]
        file_id: String,
        code: String,
    },
    /// Forward an opaque negotiation payload to another endpoint in the
    /// same room.
    Signal {
        target: String,
        data: serde_json::Value,
        #[serde(rename = "fileId")]
        file_id: String,
    },
    /// Cancel an in-progress transfer.
    CancelTransfer {
        #[serde(rename = "fileId")]
        file_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    /// Mark a transfer complete.
    TransferComplete {
        #[serde(rename = "fileId")]
        file_id: String,
    },
}

/// Events emitted to an endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundEvent {
    /// Reply to a successful `upload-init`.
    UploadCreated {
        #[serde(rename = "fileId")]
        file_id: String,
        #[serde(rename = "oneTimeCode")]
        one_time_code: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    /// Notifies the sender that a receiver joined.
    ReceiverJoined {
        #[serde(rename = "receiverId")]
        receiver_id: String,
    },
    /// Sent to a joining receiver with the session's (decrypted) metadata.
    FileMeta {
        #[serde(rename = "fileName")]
        file_name: String,
        #[serde(rename = "fileSize")]
        file_size: FileSize,
        #[serde(rename = "fileType")]
        file_type: String,
        #[serde(rename = "fileHash", skip_serializing_if = "Option::is_none")]
        file_hash: Option<String>,
        #[serde(rename = "isDangerous", skip_serializing_if = "is_false")]
        is_dangerous: bool,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    /// Forwarded negotiation payload.
    Signal {
        from: String,
        data: serde_json::Value,
    },
    /// Notifies the peer that the transfer was cancelled.
    TransferCancelled { reason: String },
    /// A client-facing error.
    Error {
        message: String,
        #[serde(rename = "invalidCode", skip_serializing_if = "Option::is_none")]
        invalid_code: Option<bool>,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_size_deserializes_from_number_or_string() {
        let from_number: InboundEvent =
            serde_json::from_str(r#"{"type":"upload-init","fileName":"a","fileSize":10,"fileType":"t"}"#)
                .unwrap();
        let from_string: InboundEvent = serde_json::from_str(
            r#"{"type":"upload-init","fileName":"a","fileSize":"10","fileType":"t"}"#,
        )
        .unwrap();

        let extract = |e: InboundEvent| match e {
            InboundEvent::UploadInit { file_size, .. } => file_size,
            _ => panic!("wrong variant"),
        };
        assert_eq!(extract(from_number), FileSize(10));
        assert_eq!(extract(from_string), FileSize(10));
    }

    #[test]
    fn file_size_serializes_as_string() {
        let event = OutboundEvent::FileMeta {
            file_name: "a.txt".into(),
            file_size: FileSize(1024),
            file_type: "text/plain".into(),
            file_hash: None,
            is_dangerous: false,
            warnings: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["fileSize"], serde_json::Value::String("1024".into()));
        assert!(json.get("isDangerous").is_none());
    }

    #[test]
    fn inbound_event_tag_is_kebab_case() {
        let event: InboundEvent =
            serde_json::from_str(r#"{"type":"join-room","fileId":"x","code":"ABC234"}"#).unwrap();
        assert!(matches!(event, InboundEvent::JoinRoom { .. }));
    }

    #[test]
    fn outbound_error_omits_invalid_code_when_absent() {
        let event = OutboundEvent::Error {
            message: "Session not found".into(),
            invalid_code: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert!(json.get("invalidCode").is_none());
    }
}
