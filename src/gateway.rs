//! The submission pipeline behind `POST /api/send-email`.
//!
//! Stages run in a fixed order and the first failure ends the request:
//! origin, rate limit, method, body decode, honeypot, required fields,
//! credentials, dispatch. Rate limiting precedes the method check, so any
//! request that reaches the endpoint with an allowed origin spends an attempt.

use crate::compose::EmailComposer;
use crate::config::{Credentials, DeploymentMode, Environment, SiteConfig, ALLOWED_ORIGINS};
use crate::error::GatewayError;
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::relay::Mailer;
use crate::request::GatewayRequest;
use crate::statistics::{StatEvent, StatsRecorder};
use crate::submission::{ContactSubmission, ResponseBody};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: ResponseBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accepted {
    Sent,
    HoneypotAbsorbed,
}

pub struct Gateway {
    mode: DeploymentMode,
    credentials: Option<Credentials>,
    limiter: Arc<dyn RateLimiter>,
    mailer: Arc<dyn Mailer>,
    composer: EmailComposer,
    stats: Option<StatsRecorder>,
}

impl Gateway {
    pub fn new(
        environment: Environment,
        site: &SiteConfig,
        limiter: Arc<dyn RateLimiter>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            mode: environment.mode,
            credentials: environment.credentials,
            limiter,
            mailer,
            composer: EmailComposer::new(site),
            stats: None,
        }
    }

    pub fn with_statistics(mut self, recorder: StatsRecorder) -> Self {
        self.stats = Some(recorder);
        self
    }

    pub async fn handle(&self, request: &GatewayRequest) -> GatewayResponse {
        let result = self.process(request).await;
        self.record(&result);

        match result {
            Ok(_) => GatewayResponse {
                status: 200,
                body: ResponseBody::sent(),
            },
            Err(error) => {
                match &error {
                    GatewayError::ServerMisconfigured(_) | GatewayError::DispatchFailed(_) => {
                        log::error!("Rejecting submission: {error}")
                    }
                    GatewayError::MethodNotAllowed(_) | GatewayError::MissingFields => {
                        log::debug!("Rejecting submission: {error}")
                    }
                    _ => log::warn!("Rejecting submission: {error}"),
                }
                GatewayResponse {
                    status: error.status(),
                    body: ResponseBody::error(error.public_message()),
                }
            }
        }
    }

    async fn process(&self, request: &GatewayRequest) -> Result<Accepted, GatewayError> {
        if self.mode.enforces_origin() && !request.origin_allowed(ALLOWED_ORIGINS) {
            return Err(GatewayError::OriginRejected {
                origin: request.origin.clone(),
                referer: request.referer.clone(),
            });
        }

        let client_ip = request.client_ip();
        log::debug!("{} submission from {}", request.method, client_ip);

        if self.limiter.check(&client_ip) == RateDecision::Limited {
            return Err(GatewayError::RateLimited { client_ip });
        }

        if !request.is_post() {
            return Err(GatewayError::MethodNotAllowed(request.method.clone()));
        }

        let submission = ContactSubmission::from_json(&request.body)
            .map_err(|e| GatewayError::MalformedBody(e.to_string()))?;

        if submission.is_bot() {
            log::warn!("Honeypot filled by {client_ip}, discarding submission");
            return Ok(Accepted::HoneypotAbsorbed);
        }

        if !submission.has_required_fields() {
            return Err(GatewayError::MissingFields);
        }

        let credentials = self.credentials.as_ref().ok_or_else(|| {
            GatewayError::ServerMisconfigured(format!(
                "{} / {} not set",
                Environment::USER_VAR,
                Environment::PASSWORD_VAR
            ))
        })?;

        let email = self.composer.compose(&submission, &credentials.user);
        self.mailer.dispatch(credentials, &email).await?;

        log::info!("Contact email dispatched to {}", email.to);
        Ok(Accepted::Sent)
    }

    fn record(&self, result: &Result<Accepted, GatewayError>) {
        let Some(stats) = &self.stats else {
            return;
        };

        let event = match result {
            Ok(Accepted::Sent) => StatEvent::Sent,
            Ok(Accepted::HoneypotAbsorbed) => StatEvent::HoneypotAbsorbed,
            Err(GatewayError::OriginRejected { .. }) => StatEvent::OriginRejected,
            Err(GatewayError::RateLimited { .. }) => StatEvent::RateLimited,
            Err(GatewayError::MethodNotAllowed(_)) => StatEvent::MethodNotAllowed,
            Err(GatewayError::MalformedBody(_) | GatewayError::MissingFields) => {
                StatEvent::Invalid
            }
            Err(GatewayError::ServerMisconfigured(_)) => StatEvent::Misconfigured,
            Err(GatewayError::DispatchFailed(_)) => StatEvent::DispatchFailed,
        };
        stats.record_event(event);
    }
}
