//! Messages exchanged with the host.
//!
//! Wire shape (JSON):
//! - `{"command":"init"}` -> `{"type":"init-complete"}`
//! - `{"command":"infer","text":"..."}` -> `{"type":"infer-complete","embedding":[...]}`
//! - any failure -> `{"type":"error","error":"<message>","details":{...}}`
use embed_core::EmbeddingVector;
use embed_error::{ErrorRecord, WorkerError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum WorkerCommand {
    Init,
    Infer { text: String },
}

impl WorkerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerCommand::Init => "init",
            WorkerCommand::Infer { .. } => "infer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerResponse {
    InitComplete,
    InferComplete {
        embedding: EmbeddingVector,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<ErrorRecord>,
    },
}

impl WorkerResponse {
    /// The structured record, for error responses that carry one.
    pub fn error_record(&self) -> Option<&ErrorRecord> {
        match self {
            WorkerResponse::Error { details, .. } => details.as_ref(),
            _ => None,
        }
    }
}

impl From<&WorkerError> for WorkerResponse {
    fn from(e: &WorkerError) -> Self {
        WorkerResponse::Error {
            error: e.message(),
            details: Some(e.to_record()),
        }
    }
}

impl From<WorkerError> for WorkerResponse {
    fn from(e: WorkerError) -> Self {
        WorkerResponse::from(&e)
    }
}

pub fn decode_command(raw: &str) -> Result<WorkerCommand, WorkerError> {
    serde_json::from_str(raw).map_err(|e| {
        WorkerError::with_cause(
            embed_error::ErrorDetail::Uncaught {
                message: "malformed command".into(),
            },
            e,
        )
    })
}

pub fn encode_response(response: &WorkerResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        serde_json::json!({
            "type": "error",
            "error": format!("failed to serialize response: {e}"),
        })
        .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use embed_core::LifecycleState;
    use embed_error::ErrorKind;

    #[test]
    fn commands_use_host_wire_names() {
        assert_eq!(decode_command(r#"{"command":"init"}"#).unwrap(), WorkerCommand::Init);
        assert_eq!(
            decode_command(r#"{"command":"infer","text":"hello"}"#).unwrap(),
            WorkerCommand::Infer {
                text: "hello".into()
            }
        );
        let err = decode_command(r#"{"command":"train"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Uncaught);
    }

    #[test]
    fn responses_use_host_wire_names() {
        assert_eq!(
            encode_response(&WorkerResponse::InitComplete),
            r#"{"type":"init-complete"}"#
        );
        assert_eq!(
            encode_response(&WorkerResponse::InferComplete {
                embedding: vec![0.5, 0.5]
            }),
            r#"{"type":"infer-complete","embedding":[0.5,0.5]}"#
        );
    }

    #[test]
    fn error_response_carries_structured_details() {
        let resp = WorkerResponse::from(WorkerError::not_initialized(LifecycleState::Uninitialized));
        let json: serde_json::Value = serde_json::from_str(&encode_response(&resp)).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(
            json["error"],
            "Worker not initialized. Call init first. (state: uninitialized)"
        );
        assert_eq!(json["details"]["kind"], "state_error");
        assert_eq!(json["details"]["details"]["state"], "uninitialized");

        let back: WorkerResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back.error_record().unwrap().kind, ErrorKind::State);
    }
}
