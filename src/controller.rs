//! Client side of the contact form: field state, the submit lifecycle and
//! the timed dismissal of the outcome banner.
//!
//! `Idle -> Submitting -> {Success, Error} -> (after the dismiss delay) Idle`.
//! The `submitting` flag is the only re-entrancy guard; a request in flight
//! always runs to completion.

use crate::submission::{ContactSubmission, SubmissionResult};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

pub const DISMISS_DELAY: Duration = Duration::from_secs(5);

lazy_static! {
    // WHATWG `input[type=email]` pattern.
    static ref EMAIL_PATTERN: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Email,
    Message,
    Honeypot,
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Field::Name),
            "email" => Ok(Field::Email),
            "message" => Ok(Field::Message),
            "honeypot" => Ok(Field::Honeypot),
            other => Err(format!("Unknown form field: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub name: String,
    pub email: String,
    pub message: String,
    pub honeypot: String,
}

impl FormState {
    /// First field the browser would refuse to submit, if any.
    pub fn constraint_violation(&self) -> Option<Field> {
        if self.name.is_empty() {
            Some(Field::Name)
        } else if self.email.is_empty() || !EMAIL_PATTERN.is_match(&self.email) {
            Some(Field::Email)
        } else if self.message.is_empty() {
            Some(Field::Message)
        } else {
            None
        }
    }

    fn set(&mut self, field: Field, value: String) {
        match field {
            Field::Name => self.name = value,
            Field::Email => self.email = value,
            Field::Message => self.message = value,
            Field::Honeypot => self.honeypot = value,
        }
    }

    fn to_submission(&self) -> ContactSubmission {
        ContactSubmission {
            name: self.name.clone(),
            email: self.email.clone(),
            message: self.message.clone(),
            honeypot: self.honeypot.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Idle,
    Success,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A submission was already in flight; nothing was sent.
    AlreadySubmitting,
    /// The form failed its input constraints; nothing was sent.
    Blocked(Field),
    Finished(SubmissionResult),
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

pub type SubmitFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, SubmitError>> + Send + 'a>>;

/// Carries one submission to the gateway.
pub trait SubmitTransport: Send + Sync {
    fn post<'a>(&'a self, submission: &'a ContactSubmission) -> SubmitFuture<'a>;
}

pub struct HttpSubmitter {
    client: Client,
    endpoint: Url,
}

impl HttpSubmitter {
    pub fn new(endpoint: &str) -> Result<Self, SubmitError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SubmitError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, endpoint })
    }

    async fn send(&self, submission: &ContactSubmission) -> Result<TransportResponse, SubmitError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(submission)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(TransportResponse { status, body })
    }
}

impl SubmitTransport for HttpSubmitter {
    fn post<'a>(&'a self, submission: &'a ContactSubmission) -> SubmitFuture<'a> {
        Box::pin(self.send(submission))
    }
}

#[derive(Default)]
struct Inner {
    form: FormState,
    submitting: bool,
    status: Status,
    dismiss: Option<JoinHandle<()>>,
}

pub struct ContactForm {
    inner: Arc<Mutex<Inner>>,
    transport: Arc<dyn SubmitTransport>,
    dismiss_after: Duration,
}

impl ContactForm {
    pub fn new(transport: Arc<dyn SubmitTransport>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            transport,
            dismiss_after: DISMISS_DELAY,
        }
    }

    pub fn with_dismiss_delay(mut self, delay: Duration) -> Self {
        self.dismiss_after = delay;
        self
    }

    pub fn update_field(&self, field: Field, value: impl Into<String>) {
        lock(&self.inner).form.set(field, value.into());
    }

    pub fn form(&self) -> FormState {
        lock(&self.inner).form.clone()
    }

    pub fn status(&self) -> Status {
        lock(&self.inner).status.clone()
    }

    pub fn is_submitting(&self) -> bool {
        lock(&self.inner).submitting
    }

    /// Sends the current form once. Must run inside a tokio runtime.
    pub async fn submit(&self) -> SubmitOutcome {
        let submission = {
            let mut inner = lock(&self.inner);
            if inner.submitting {
                return SubmitOutcome::AlreadySubmitting;
            }
            if let Some(field) = inner.form.constraint_violation() {
                return SubmitOutcome::Blocked(field);
            }
            // A new attempt supersedes the previous banner.
            if let Some(pending) = inner.dismiss.take() {
                pending.abort();
            }
            inner.status = Status::Idle;
            inner.submitting = true;
            inner.form.to_submission()
        };

        // The request lives in its own task so it finishes and releases the
        // `submitting` flag even if this future is dropped.
        let request = tokio::spawn(complete_submission(
            self.inner.clone(),
            self.transport.clone(),
            submission,
            self.dismiss_after,
        ));

        match request.await {
            Ok(result) => SubmitOutcome::Finished(result),
            Err(e) => {
                log::error!("Contact form submission task failed: {e}");
                let message = SubmissionResult::GENERIC_FAILURE.to_string();
                {
                    let mut inner = lock(&self.inner);
                    inner.status = Status::Error(message.clone());
                    inner.submitting = false;
                }
                schedule_dismiss(&self.inner, self.dismiss_after);
                SubmitOutcome::Finished(SubmissionResult::ServerError(message))
            }
        }
    }
}

async fn complete_submission(
    inner: Arc<Mutex<Inner>>,
    transport: Arc<dyn SubmitTransport>,
    submission: ContactSubmission,
    dismiss_after: Duration,
) -> SubmissionResult {
    let result = match transport.post(&submission).await {
        Ok(response) => SubmissionResult::from_response(response.status, &response.body),
        Err(e) => {
            log::warn!("Contact form submission failed: {e}");
            SubmissionResult::ServerError(SubmissionResult::GENERIC_FAILURE.to_string())
        }
    };

    {
        let mut state = lock(&inner);
        match &result {
            SubmissionResult::Success => {
                state.status = Status::Success;
                state.form = FormState::default();
            }
            SubmissionResult::Rejected(message) | SubmissionResult::ServerError(message) => {
                state.status = Status::Error(message.clone());
            }
        }
        state.submitting = false;
    }

    schedule_dismiss(&inner, dismiss_after);
    result
}

fn schedule_dismiss(inner: &Arc<Mutex<Inner>>, delay: Duration) {
    let form = Arc::downgrade(inner);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(inner) = form.upgrade() {
            lock(&inner).status = Status::Idle;
        }
    });

    if let Some(previous) = lock(inner).dismiss.replace(handle) {
        previous.abort();
    }
}

impl Drop for ContactForm {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.inner).dismiss.take() {
            pending.abort();
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Answers every post with a fixed response, optionally waiting for a
    /// release signal first.
    struct FakeTransport {
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        delay: Option<Duration>,
        response: Result<TransportResponse, String>,
        last: Mutex<Option<ContactSubmission>>,
    }

    impl FakeTransport {
        fn answering(status: u16, body: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: None,
                delay: None,
                response: Ok(TransportResponse {
                    status,
                    body: body.as_bytes().to_vec(),
                }),
                last: Mutex::new(None),
            }
        }

        fn unreachable() -> Self {
            Self {
                response: Err("connection refused".to_string()),
                ..Self::answering(0, "")
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SubmitTransport for FakeTransport {
        fn post<'a>(&'a self, submission: &'a ContactSubmission) -> SubmitFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                *self.last.lock().unwrap() = Some(submission.clone());
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                match &self.response {
                    Ok(response) => Ok(response.clone()),
                    Err(reason) => Err(SubmitError::InvalidEndpoint(reason.clone())),
                }
            })
        }
    }

    const SENT: &str = r#"{"message":"Email sent successfully"}"#;

    fn filled_form(transport: Arc<FakeTransport>) -> ContactForm {
        let form = ContactForm::new(transport);
        form.update_field(Field::Name, "Ana");
        form.update_field(Field::Email, "ana@x.com");
        form.update_field(Field::Message, "Hi");
        form
    }

    #[test]
    fn test_field_names() {
        assert_eq!("name".parse::<Field>(), Ok(Field::Name));
        assert_eq!("honeypot".parse::<Field>(), Ok(Field::Honeypot));
        assert!("phone".parse::<Field>().is_err());
    }

    #[test]
    fn test_constraint_violations() {
        let mut form = FormState {
            name: "Ana".to_string(),
            email: "ana@x.com".to_string(),
            message: "Hi".to_string(),
            honeypot: String::new(),
        };
        assert_eq!(form.constraint_violation(), None);

        form.email = "not-an-email".to_string();
        assert_eq!(form.constraint_violation(), Some(Field::Email));

        form.email = "ana@localhost".to_string();
        assert_eq!(form.constraint_violation(), None);

        form.message.clear();
        assert_eq!(form.constraint_violation(), Some(Field::Message));

        form.name.clear();
        assert_eq!(form.constraint_violation(), Some(Field::Name));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_submit_resets_form() {
        let transport = Arc::new(FakeTransport::answering(200, SENT));
        let form = filled_form(transport.clone());

        let outcome = form.submit().await;

        assert_eq!(outcome, SubmitOutcome::Finished(SubmissionResult::Success));
        assert_eq!(form.status(), Status::Success);
        assert_eq!(form.form(), FormState::default());
        assert!(!form.is_submitting());
        assert_eq!(transport.calls(), 1);
        let sent = transport.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.name, "Ana");
        assert_eq!(sent.honeypot, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_dismissed_after_delay() {
        let transport = Arc::new(FakeTransport::answering(200, SENT));
        let form = filled_form(transport);

        form.submit().await;
        assert_eq!(form.status(), Status::Success);

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(form.status(), Status::Success);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(form.status(), Status::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_message_shown_verbatim_and_form_kept() {
        let transport = Arc::new(FakeTransport::answering(
            429,
            r#"{"error":"Too many email attempts. Please try again in 15 minutes."}"#,
        ));
        let form = filled_form(transport);

        let outcome = form.submit().await;

        assert!(matches!(
            outcome,
            SubmitOutcome::Finished(SubmissionResult::Rejected(_))
        ));
        assert_eq!(
            form.status(),
            Status::Error("Too many email attempts. Please try again in 15 minutes.".to_string())
        );
        assert_eq!(form.form().name, "Ana");

        tokio::time::sleep(DISMISS_DELAY + Duration::from_millis(100)).await;
        assert_eq!(form.status(), Status::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_error_uses_generic_message() {
        let transport = Arc::new(FakeTransport::answering(502, "<html>Bad Gateway</html>"));
        let form = filled_form(transport);

        form.submit().await;
        assert_eq!(
            form.status(),
            Status::Error(SubmissionResult::GENERIC_FAILURE.to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_an_error_without_retry() {
        let transport = Arc::new(FakeTransport::unreachable());
        let form = filled_form(transport.clone());

        let outcome = form.submit().await;
        assert_eq!(
            outcome,
            SubmitOutcome::Finished(SubmissionResult::ServerError(
                SubmissionResult::GENERIC_FAILURE.to_string()
            ))
        );
        tokio::time::sleep(DISMISS_DELAY * 2).await;
        assert_eq!(transport.calls(), 1);
        assert_eq!(form.status(), Status::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentrant_submit_is_ignored() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(FakeTransport::answering(200, SENT).gated(gate.clone()));
        let form = filled_form(transport.clone());

        let first = form.submit();
        let second = async {
            // Let the first submission reach the transport.
            tokio::task::yield_now().await;
            assert!(form.is_submitting());
            let outcome = form.submit().await;
            gate.notify_one();
            outcome
        };

        let (first, second) = tokio::join!(first, second);

        assert_eq!(second, SubmitOutcome::AlreadySubmitting);
        assert_eq!(first, SubmitOutcome::Finished(SubmissionResult::Success));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_submit_still_completes() {
        let transport =
            Arc::new(FakeTransport::answering(200, SENT).delayed(Duration::from_secs(3)));
        let form = filled_form(transport.clone());

        let abandoned = tokio::time::timeout(Duration::from_secs(1), form.submit()).await;
        assert!(abandoned.is_err());
        assert!(form.is_submitting());
        assert_eq!(form.submit().await, SubmitOutcome::AlreadySubmitting);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!form.is_submitting());
        assert_eq!(form.status(), Status::Success);

        form.update_field(Field::Name, "Ana");
        form.update_field(Field::Email, "ana@x.com");
        form.update_field(Field::Message, "Hi again");
        assert_eq!(
            form.submit().await,
            SubmitOutcome::Finished(SubmissionResult::Success)
        );
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_blocked_form_sends_nothing() {
        let transport = Arc::new(FakeTransport::answering(200, SENT));
        let form = ContactForm::new(transport.clone());
        form.update_field(Field::Name, "Ana");
        form.update_field(Field::Email, "ana at x.com");
        form.update_field(Field::Message, "Hi");

        assert_eq!(form.submit().await, SubmitOutcome::Blocked(Field::Email));
        assert_eq!(form.status(), Status::Idle);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_attempt_cancels_previous_dismissal() {
        let transport = Arc::new(FakeTransport::answering(
            500,
            r#"{"error":"Failed to send email"}"#,
        ));
        let form = filled_form(transport.clone());

        form.submit().await;
        tokio::time::sleep(Duration::from_secs(4)).await;
        form.submit().await;
        assert_eq!(form.status(), Status::Error("Failed to send email".to_string()));

        // The first timer would have fired here.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(form.status(), Status::Error("Failed to send email".to_string()));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(form.status(), Status::Idle);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_form_releases_state() {
        let transport = Arc::new(FakeTransport::answering(200, SENT));
        let form = filled_form(transport);
        form.submit().await;

        let inner = Arc::downgrade(&form.inner);
        drop(form);
        tokio::time::sleep(DISMISS_DELAY).await;
        assert!(inner.upgrade().is_none());
    }

    #[test]
    fn test_http_submitter_rejects_bad_endpoint() {
        assert!(matches!(
            HttpSubmitter::new("not a url"),
            Err(SubmitError::InvalidEndpoint(_))
        ));
    }
}
