use {
    serde::{Serialize, Deserialize},
    http::StatusCode,
};

pub use crate::request::{CounterRequest, QUERY_PARAM_SEQUENCE};

mod request;

/// Returned in `visit_count` when the count is unknown: validation failed or the request errored.
pub const VISIT_COUNT_UNKNOWN: i64 = -1;

pub const MESSAGE_MISSING_SEQUENCE: &str = "missing query param 'sequence'";
pub const MESSAGE_INTERNAL_ERROR: &str = "Something went wrong!";

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Row of `website_hit_sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceCounter {
    pub id: i64,
    pub sequence_name: String,
    pub sequence_count: i64,
}

/// Outcome of one counter request, serialized to json only at the http boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitCountResponse {
    Counted {
        visit_count: i64,
    },
    Failed {
        status: StatusCode,
        message: String,
    },
}

impl VisitCountResponse {
    pub fn counted(visit_count: i64) -> Self {
        Self::Counted { visit_count }
    }

    /// Validation failures keep the default success status, the error is only reported in the body.
    pub fn missing_sequence() -> Self {
        Self::Failed {
            status: StatusCode::OK,
            message: MESSAGE_MISSING_SEQUENCE.to_owned(),
        }
    }

    pub fn internal_error() -> Self {
        Self::Failed {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: MESSAGE_INTERNAL_ERROR.to_owned(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Counted { .. } => StatusCode::OK,
            Self::Failed { status, .. } => *status,
        }
    }

    pub fn visit_count(&self) -> i64 {
        match self {
            Self::Counted { visit_count } => *visit_count,
            Self::Failed { .. } => VISIT_COUNT_UNKNOWN,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    pub fn body(&self) -> VisitCountBody {
        match self {
            Self::Counted { visit_count } => VisitCountBody {
                visit_count: visit_count.to_string(),
                error: None,
            },
            Self::Failed { message, .. } => VisitCountBody {
                visit_count: VISIT_COUNT_UNKNOWN.to_string(),
                error: Some(message.clone()),
            },
        }
    }

    pub fn to_json(&self) -> String {
        self.body().to_json()
    }
}

/// Wire format of the response. Both fields are strings, `error` is present only on failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitCountBody {
    pub visit_count: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VisitCountBody {
    pub fn to_json(&self) -> String {
        // a struct of two strings always serializes
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!("{{\"visit_count\":\"{VISIT_COUNT_UNKNOWN}\"}}"))
    }
}
