use serde::{Deserialize, Serialize};

/// Contact form payload as posted by the front end.
///
/// Missing keys decode to empty strings so that the required-field check,
/// not the decoder, decides whether a submission is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSubmission {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub honeypot: String,
}

impl ContactSubmission {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// A filled honeypot means the form was completed by a bot.
    pub fn is_bot(&self) -> bool {
        !self.honeypot.is_empty()
    }

    pub fn has_required_fields(&self) -> bool {
        [&self.name, &self.email, &self.message]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

/// JSON body returned by the gateway: `{"message": ..}` or `{"error": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Message { message: String },
    Error { error: String },
}

impl ResponseBody {
    pub const SENT: &'static str = "Email sent successfully";

    pub fn sent() -> Self {
        ResponseBody::Message {
            message: Self::SENT.to_string(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        ResponseBody::Error { error: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            ResponseBody::Message { message } => message,
            ResponseBody::Error { error } => error,
        }
    }
}

/// Outcome of one submission as seen by the form controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Success,
    Rejected(String),
    ServerError(String),
}

impl SubmissionResult {
    pub const GENERIC_FAILURE: &'static str = "Failed to send message. Please try again later.";

    pub fn from_response(status: u16, body: &[u8]) -> Self {
        if (200..300).contains(&status) {
            return SubmissionResult::Success;
        }

        let message = serde_json::from_slice::<ResponseBody>(body)
            .map(|body| body.text().to_string())
            .unwrap_or_else(|_| Self::GENERIC_FAILURE.to_string());

        if (400..500).contains(&status) {
            SubmissionResult::Rejected(message)
        } else {
            SubmissionResult::ServerError(message)
        }
    }
}
