use std::net::SocketAddr;

/// Transport-independent view of an incoming submission request.
#[derive(Debug, Clone, Default)]
pub struct GatewayRequest {
    pub method: String,
    pub origin: Option<String>,
    pub referer: Option<String>,
    pub forwarded_for: Option<String>,
    pub remote_addr: Option<SocketAddr>,
    pub body: Vec<u8>,
}

impl GatewayRequest {
    pub fn post(body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: "POST".to_string(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    pub fn with_referer(mut self, referer: &str) -> Self {
        self.referer = Some(referer.to_string());
        self
    }

    pub fn with_forwarded_for(mut self, forwarded_for: &str) -> Self {
        self.forwarded_for = Some(forwarded_for.to_string());
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// True when `Origin` equals an allowed entry or `Referer` starts with one.
    pub fn origin_allowed(&self, allowed: &[&str]) -> bool {
        allowed.iter().any(|entry| {
            self.origin.as_deref() == Some(*entry)
                || self
                    .referer
                    .as_deref()
                    .is_some_and(|referer| referer.starts_with(entry))
        })
    }

    /// Rate-limit key for the caller.
    ///
    /// First `X-Forwarded-For` entry, else the socket peer, else `"unknown"`.
    /// Every caller without an address lands in the same `"unknown"` bucket.
    pub fn client_ip(&self) -> String {
        if let Some(forwarded) = &self.forwarded_for {
            let first = forwarded.split(',').next().unwrap_or_default().trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }

        self.remote_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn is_post(&self) -> bool {
        self.method == "POST"
    }
}
