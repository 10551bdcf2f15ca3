//! Audit records and hashing.
//!
//! Records are chain-linked: each carries the hash of its predecessor, and
//! its own hash covers every other field. The first record links to the
//! zero hash.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_core::{Arguments, CorrelationId, ErrorCode, ExecutionStatus, PrincipalId, Timestamp};

use crate::error::AuditResult;

/// Hash linked from the first record.
#[must_use]
pub fn zero_hash() -> String {
    hex::encode([0u8; blake3::OUT_LEN])
}

/// BLAKE3 digest of the canonical JSON form of `args`.
///
/// Arguments are never stored raw; two argument maps with the same content
/// produce the same digest regardless of key order.
#[must_use]
pub fn arguments_digest(args: &Arguments) -> String {
    let mut out = String::new();
    write_canonical(&Value::Object(args.clone()), &mut out);
    blake3::hash(out.as_bytes()).to_hex().to_string()
}

/// Serialize `value` with object keys sorted and no insignificant space.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        },
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Everything about an outcome except its position in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDraft {
    /// Call id.
    pub correlation_id: CorrelationId,
    /// Caller.
    pub principal_id: PrincipalId,
    /// Requested tool.
    pub tool_name: String,
    /// Digest of the call arguments.
    pub arguments_digest: String,
    /// Final status.
    pub status: ExecutionStatus,
    /// Error code for non-success outcomes.
    pub error_code: Option<ErrorCode>,
    /// Redactions applied to the output.
    pub redaction_count: usize,
    /// Pipeline duration.
    pub duration_ms: u64,
}

impl AuditDraft {
    /// Draft for a call, digesting its arguments.
    #[must_use]
    pub fn new(
        correlation_id: CorrelationId,
        principal_id: PrincipalId,
        tool_name: impl Into<String>,
        args: &Arguments,
        status: ExecutionStatus,
    ) -> Self {
        Self {
            correlation_id,
            principal_id,
            tool_name: tool_name.into(),
            arguments_digest: arguments_digest(args),
            status,
            error_code: None,
            redaction_count: 0,
            duration_ms: 0,
        }
    }

    /// Set the error code.
    #[must_use]
    pub fn with_error_code(mut self, code: Option<ErrorCode>) -> Self {
        self.error_code = code;
        self
    }

    /// Set the redaction count.
    #[must_use]
    pub fn with_redactions(mut self, count: usize) -> Self {
        self.redaction_count = count;
        self
    }

    /// Set the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// One immutable entry in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Position in the log, starting at 1, without gaps.
    pub sequence: u64,
    /// Call id.
    pub correlation_id: CorrelationId,
    /// Caller.
    pub principal_id: PrincipalId,
    /// Requested tool.
    pub tool_name: String,
    /// Digest of the call arguments.
    pub arguments_digest: String,
    /// Final status.
    pub status: ExecutionStatus,
    /// Error code for non-success outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Redactions applied to the output.
    pub redaction_count: usize,
    /// Pipeline duration.
    pub duration_ms: u64,
    /// When the record was appended.
    pub timestamp: Timestamp,
    /// Hash of the previous record.
    pub previous_hash: String,
    /// Hash of this record.
    pub hash: String,
}

impl AuditRecord {
    /// Seal a draft at `sequence`, linked to `previous_hash`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the record cannot be hashed.
    pub fn seal(
        draft: AuditDraft,
        sequence: u64,
        previous_hash: String,
        timestamp: Timestamp,
    ) -> AuditResult<Self> {
        let mut record = Self {
            sequence,
            correlation_id: draft.correlation_id,
            principal_id: draft.principal_id,
            tool_name: draft.tool_name,
            arguments_digest: draft.arguments_digest,
            status: draft.status,
            error_code: draft.error_code,
            redaction_count: draft.redaction_count,
            duration_ms: draft.duration_ms,
            timestamp,
            previous_hash,
            hash: String::new(),
        };
        record.hash = record.content_hash()?;
        Ok(record)
    }

    /// Hash over every field except `hash`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the record cannot be encoded.
    pub fn content_hash(&self) -> AuditResult<String> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("hash");
        }
        let mut out = String::new();
        write_canonical(&value, &mut out);
        Ok(blake3::hash(out.as_bytes()).to_hex().to_string())
    }

    /// Whether the stored hash matches the contents.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.content_hash().is_ok_and(|h| h == self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    fn draft() -> AuditDraft {
        AuditDraft::new(
            CorrelationId::from_string("c-1"),
            PrincipalId::new("alice"),
            "kubernetes_get",
            &args(json!({"namespace": "default"})),
            ExecutionStatus::Completed,
        )
    }

    #[test]
    fn test_digest_ignores_key_order() {
        let a = args(json!({"a": 1, "b": {"x": true, "y": [1, 2]}}));
        let b = args(json!({"b": {"y": [1, 2], "x": true}, "a": 1}));
        assert_eq!(arguments_digest(&a), arguments_digest(&b));
        assert_eq!(arguments_digest(&a).len(), 64);
    }

    #[test]
    fn test_digest_hides_values() {
        let digest = arguments_digest(&args(json!({"password": "hunter2"})));
        assert!(!digest.contains("hunter2"));
    }

    #[test]
    fn test_seal_and_tamper_detection() {
        let mut record = AuditRecord::seal(draft(), 1, zero_hash(), Timestamp::now()).unwrap();
        assert!(record.is_intact());
        record.tool_name = "kubernetes_delete".into();
        assert!(!record.is_intact());
    }

    #[test]
    fn test_record_survives_json() {
        let record = AuditRecord::seal(
            draft().with_error_code(Some(ErrorCode::ExecutionTimeout)),
            7,
            zero_hash(),
            Timestamp::now(),
        )
        .unwrap();
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("\"correlationId\":\"c-1\""));
        let back: AuditRecord = serde_json::from_str(&line).unwrap();
        assert!(back.is_intact());
        assert_eq!(back, record);
    }
}
