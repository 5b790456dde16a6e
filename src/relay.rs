use crate::compose::OutgoingEmail;
use crate::config::{Credentials, DeploymentMode, RelayConfig};
use crate::error::RelayError;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub type DispatchFuture<'a> = Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + 'a>>;

/// Delivers composed messages. One call, one delivery attempt.
pub trait Mailer: Send + Sync {
    fn dispatch<'a>(
        &'a self,
        credentials: &'a Credentials,
        email: &'a OutgoingEmail,
    ) -> DispatchFuture<'a>;
}

/// Authenticated SMTP submission over implicit TLS.
///
/// A transport is opened per message with the credentials handed to
/// [`Mailer::dispatch`], so rotated secrets apply on the next request.
pub struct SmtpRelay {
    host: String,
    port: u16,
    timeout: Duration,
    tls: TlsParameters,
}

impl SmtpRelay {
    pub fn new(config: &RelayConfig, mode: DeploymentMode) -> Result<Self, RelayError> {
        if !mode.verifies_relay_tls() {
            log::warn!("Relay TLS certificate validation is disabled ({mode} mode)");
        }

        let tls = TlsParameters::builder(config.host.clone())
            .dangerous_accept_invalid_certs(!mode.verifies_relay_tls())
            .build()?;

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            timeout: config.timeout(),
            tls,
        })
    }

    fn transport(&self, credentials: &Credentials) -> AsyncSmtpTransport<Tokio1Executor> {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.host.as_str())
            .port(self.port)
            .tls(Tls::Wrapper(self.tls.clone()))
            .credentials(SmtpCredentials::new(
                credentials.user.clone(),
                credentials.password.clone(),
            ))
            .timeout(Some(self.timeout))
            .build()
    }

    async fn send(&self, credentials: &Credentials, email: &OutgoingEmail) -> Result<(), RelayError> {
        let message = build_message(email)?;
        let response = self.transport(credentials).send(message).await?;
        log::debug!(
            "Relay {}:{} accepted message: {}",
            self.host,
            self.port,
            response.code()
        );
        Ok(())
    }
}

impl Mailer for SmtpRelay {
    fn dispatch<'a>(
        &'a self,
        credentials: &'a Credentials,
        email: &'a OutgoingEmail,
    ) -> DispatchFuture<'a> {
        Box::pin(self.send(credentials, email))
    }
}

/// Renders `email` as a `multipart/alternative` MIME message.
pub fn build_message(email: &OutgoingEmail) -> Result<Message, RelayError> {
    let message = Message::builder()
        .from(email.from.parse::<Mailbox>()?)
        .to(email.to.parse::<Mailbox>()?)
        .reply_to(email.reply_to.parse::<Mailbox>()?)
        .subject(email.subject.as_str())
        .multipart(MultiPart::alternative_plain_html(
            email.text.clone(),
            email.html.clone(),
        ))?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            from: "\"Ana\" <owner@example.com>".to_string(),
            to: "owner@example.com".to_string(),
            reply_to: "ana@x.com".to_string(),
            subject: "New message from portfolio: Ana".to_string(),
            text: "Name: Ana\n".to_string(),
            html: "<p>Ana</p>".to_string(),
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            user: "owner@example.com".to_string(),
            password: "app-password".to_string(),
        }
    }

    #[test]
    fn test_message_headers_and_parts() {
        let message = build_message(&email()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("<owner@example.com>"));
        assert!(raw.contains("To: owner@example.com"));
        assert!(raw.contains("Reply-To: ana@x.com"));
        assert!(raw.contains("Subject: New message from portfolio: Ana"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_invalid_reply_to_is_an_address_error() {
        let mut email = email();
        email.reply_to = "not an address".to_string();

        assert!(matches!(
            build_message(&email),
            Err(RelayError::Address(_))
        ));
    }

    #[test]
    fn test_relay_builds_in_every_mode() {
        let config = RelayConfig {
            host: "smtp.example.com".to_string(),
            port: 465,
            timeout_seconds: Some(5),
        };
        for mode in [
            DeploymentMode::Production,
            DeploymentMode::Development,
            DeploymentMode::Local,
        ] {
            assert!(SmtpRelay::new(&config, mode).is_ok(), "{mode}");
        }
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_an_smtp_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let relay = SmtpRelay::new(
            &RelayConfig {
                host: "127.0.0.1".to_string(),
                port,
                timeout_seconds: Some(2),
            },
            DeploymentMode::Local,
        )
        .unwrap();

        let result = relay.dispatch(&credentials(), &email()).await;
        assert!(matches!(result, Err(RelayError::Smtp(_))));
    }
}
