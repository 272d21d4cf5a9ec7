//! # JSON-Lines Commands
//!
//! One command per input line, one response per output line.
//!
//! ```text
//! {"cmd":"submit","draft":{...}}          producer submission
//! {"cmd":"authorize","draft":{...}}       irreversible action only
//! {"cmd":"decision","decision":{...}}     Core decision, put on the channel
//! {"cmd":"verify_chain"}
//! {"cmd":"export"}
//! {"cmd":"summary"}
//! {"cmd":"clear_halt","operator":"..."}
//! {"cmd":"metrics"}
//! ```
//!
//! Responses are `{"ok":true,"result":...}` or
//! `{"ok":false,"code":"...","error":"..."}`. A `TIMED_OUT` outcome is a
//! result, not an error, and additionally carries `AUTHORIZATION_TIMEOUT`.

use crate::container::{SubmitResult, TrustGateway};
use kg_03_audit_log::AuditError;
use kg_04_authorization_gate::AuthorizationOutcome;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{AuthorizationState, GatewayError, SchemaViolation};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Submit { draft: Value },
    Authorize { draft: Value },
    Decision { decision: Value },
    VerifyChain,
    Export,
    Summary,
    ClearHalt { operator: String },
    Metrics,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Submit { .. } => "submit",
            Command::Authorize { .. } => "authorize",
            Command::Decision { .. } => "decision",
            Command::VerifyChain => "verify_chain",
            Command::Export => "export",
            Command::Summary => "summary",
            Command::ClearHalt { .. } => "clear_halt",
            Command::Metrics => "metrics",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            code: None,
            error: None,
        }
    }

    pub fn failure(err: &GatewayError) -> Self {
        Self {
            ok: false,
            result: None,
            code: Some(err.error_code()),
            error: Some(err.to_string()),
        }
    }

    /// Refusal that has no gateway-wide error code.
    pub fn rejected(code: &'static str, error: String) -> Self {
        Self {
            ok: false,
            result: None,
            code: Some(code),
            error: Some(error),
        }
    }

    fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    /// Single-line JSON.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"ok":false,"code":"INTERNAL","error":"response encoding failed"}"#.to_string()
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, GatewayError> {
    serde_json::to_value(value).map_err(|e| GatewayError::Internal(e.to_string()))
}

fn outcome_response(outcome: &AuthorizationOutcome, result: Value) -> Response {
    let response = Response::success(result);
    if outcome.state() == AuthorizationState::TimedOut {
        let timeout = GatewayError::AuthorizationTimeout {
            request_id: outcome.request_id().to_string(),
        };
        return response.with_code(timeout.error_code());
    }
    response
}

/// Dispatches commands against one gateway.
#[derive(Clone)]
pub struct CommandHandler {
    gateway: Arc<TrustGateway>,
}

impl CommandHandler {
    pub fn new(gateway: Arc<TrustGateway>) -> Self {
        Self { gateway }
    }

    /// Parse and execute one input line.
    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Command>(line) {
            Ok(command) => self.handle(command).await,
            Err(e) => {
                debug!(error = %e, "Unparsable command line");
                Response::failure(&GatewayError::SchemaViolation(SchemaViolation::malformed()))
            }
        }
    }

    pub async fn handle(&self, command: Command) -> Response {
        let name = command.name();
        match self.execute(command).await {
            Ok(response) => response,
            Err(err) => {
                if err.is_security_event() {
                    warn!(command = name, code = err.error_code(), "Command rejected");
                } else {
                    debug!(command = name, code = err.error_code(), "Command rejected");
                }
                Response::failure(&err)
            }
        }
    }

    async fn execute(&self, command: Command) -> Result<Response, GatewayError> {
        let gateway = &self.gateway;
        match command {
            Command::Submit { draft } => {
                let result = gateway.submit(&draft).await.map_err(GatewayError::from)?;
                let value = encode(&result)?;
                Ok(match &result {
                    SubmitResult::Authorized { outcome } => outcome_response(outcome, value),
                    SubmitResult::Published { .. } => Response::success(value),
                })
            }
            Command::Authorize { draft } => {
                let outcome = gateway
                    .authorize_raw(&draft)
                    .await
                    .map_err(GatewayError::from)?;
                Ok(outcome_response(&outcome, encode(&outcome)?))
            }
            Command::Decision { decision } => {
                let receivers = gateway.publish_decision(&decision).await?;
                Ok(Response::success(json!({ "receivers": receivers })))
            }
            Command::VerifyChain => {
                let entries = gateway.verify_chain().await?;
                Ok(Response::success(json!({ "valid": true, "entries": entries })))
            }
            Command::Export => Ok(Response::success(encode(&gateway.export()?)?)),
            Command::Summary => Ok(Response::success(encode(&gateway.summary())?)),
            Command::ClearHalt { operator } => {
                match gateway.clear_integrity_halt(&operator).await {
                    Ok(entry) => Ok(Response::success(encode(&entry)?)),
                    Err(err @ AuditError::NotHalted) => {
                        Ok(Response::rejected(err.error_code(), err.to_string()))
                    }
                    Err(err) => Err(err.into()),
                }
            }
            Command::Metrics => {
                let text = gateway_telemetry::gather_metrics()
                    .map_err(|e| GatewayError::Internal(e.to_string()))?;
                Ok(Response::success(Value::String(text)))
            }
        }
    }
}
