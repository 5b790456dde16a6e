/// Terminal outcomes of the submission pipeline other than success.
///
/// The `Display` text is for server-side logs and may carry internal detail;
/// callers only ever see [`GatewayError::public_message`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("origin not allowed (origin: {origin:?}, referer: {referer:?})")]
    OriginRejected {
        origin: Option<String>,
        referer: Option<String>,
    },
    #[error("rate limit exceeded for {client_ip}")]
    RateLimited { client_ip: String },
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    #[error("required fields missing")]
    MissingFields,
    #[error("server misconfigured: {0}")]
    ServerMisconfigured(String),
    #[error("email dispatch failed: {0}")]
    DispatchFailed(#[from] RelayError),
}

impl GatewayError {
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::OriginRejected { .. } => 403,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::MethodNotAllowed(_) => 405,
            GatewayError::MalformedBody(_) | GatewayError::MissingFields => 400,
            GatewayError::ServerMisconfigured(_) | GatewayError::DispatchFailed(_) => 500,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::OriginRejected { .. } => "Forbidden: Access denied from this origin.",
            GatewayError::RateLimited { .. } => {
                "Too many email attempts. Please try again in 15 minutes."
            }
            GatewayError::MethodNotAllowed(_) => "Method not allowed",
            GatewayError::MalformedBody(_) => "Invalid request body",
            GatewayError::MissingFields => "Missing required fields",
            GatewayError::ServerMisconfigured(_) => "Server configuration error",
            GatewayError::DispatchFailed(_) => "Failed to send email",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}
