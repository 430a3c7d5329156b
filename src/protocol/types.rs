// src/protocol/types.rs — Request and response envelopes

use serde::Serialize;
use serde_json::Value;

/// Request kind. Kinds this adapter does not handle are kept by name and
/// answered with a bare acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    Start,
    Define,
    Evaluate,
    Other(String),
}

impl Kind {
    pub fn parse(name: &str) -> Self {
        match name {
            "start" => Kind::Start,
            "define" => Kind::Define,
            "evaluate" => Kind::Evaluate,
            other => Kind::Other(other.to_string()),
        }
    }
}

/// A decoded request line.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Start {
        id: Value,
    },
    Define {
        id: Value,
        module: String,
    },
    Evaluate {
        id: Value,
        module: String,
        function: String,
        input: Value,
    },
    Other {
        id: Value,
        kind: String,
    },
}

impl Request {
    /// Caller-assigned correlation token, echoed verbatim in the response.
    pub fn id(&self) -> &Value {
        match self {
            Request::Start { id }
            | Request::Define { id, .. }
            | Request::Evaluate { id, .. }
            | Request::Other { id, .. } => id,
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Request::Start { .. } => Kind::Start,
            Request::Define { .. } => Kind::Define,
            Request::Evaluate { .. } => Kind::Evaluate,
            Request::Other { kind, .. } => Kind::Other(kind.clone()),
        }
    }
}

/// One measured duration reported alongside an evaluate result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timing {
    pub name: String,
    pub nanoseconds: u64,
}

impl Timing {
    pub fn evaluate(nanoseconds: u64) -> Self {
        Self {
            name: "evaluate".into(),
            nanoseconds,
        }
    }
}

/// A response line: the request id followed by the kind-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: Value,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Start {
        tool: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<Value>,
    },
    Define {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Evaluate {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timings: Option<Vec<Timing>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Ack {},
}

impl Response {
    pub fn start(id: Value, tool: impl Into<String>, config: Option<Value>) -> Self {
        Self {
            id,
            body: ResponseBody::Start {
                tool: tool.into(),
                config,
            },
        }
    }

    pub fn defined(id: Value) -> Self {
        Self {
            id,
            body: ResponseBody::Define {
                success: true,
                error: None,
            },
        }
    }

    pub fn define_failed(id: Value, error: impl Into<String>) -> Self {
        Self {
            id,
            body: ResponseBody::Define {
                success: false,
                error: Some(error.into()),
            },
        }
    }

    pub fn evaluated(id: Value, output: Value, timings: Vec<Timing>) -> Self {
        Self {
            id,
            body: ResponseBody::Evaluate {
                success: true,
                output: Some(output),
                timings: Some(timings),
                error: None,
            },
        }
    }

    pub fn evaluate_failed(id: Value, error: impl Into<String>) -> Self {
        Self {
            id,
            body: ResponseBody::Evaluate {
                success: false,
                output: None,
                timings: None,
                error: Some(error.into()),
            },
        }
    }

    pub fn ack(id: Value) -> Self {
        Self {
            id,
            body: ResponseBody::Ack {},
        }
    }

    /// `Some(success)` for define and evaluate responses.
    pub fn success(&self) -> Option<bool> {
        match &self.body {
            ResponseBody::Define { success, .. } | ResponseBody::Evaluate { success, .. } => {
                Some(*success)
            }
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Define { error, .. } | ResponseBody::Evaluate { error, .. } => {
                error.as_deref()
            }
            _ => None,
        }
    }
}
