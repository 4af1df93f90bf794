//! Out-of-band delivery of login links.
//!
//! The gateway hands every issued link to a [`Notifier`] on a background
//! task bounded by the rule's delivery timeout. Delivery errors are logged
//! and never reach the client.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};
use tracing::{error, info, instrument, Instrument};

pub const DEFAULT_SUBJECT: &str = "Your login link";

pub const DEFAULT_TEMPLATE: &str = "Hello {handle},

Use the link below to sign in:

{url}

If you did not ask for this link you can ignore this message.
";

/// Delivers a login URL to a handle.
pub trait Notifier: Send + Sync {
    fn send<'a>(
        &'a self,
        handle: &'a str,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Rendered login message.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct LoginMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Sender, subject and body template for login messages. The template may
/// reference `{handle}` and `{url}`.
#[derive(Clone, Debug)]
pub struct MessageTemplate {
    from: String,
    subject: String,
    body: String,
}

impl MessageTemplate {
    #[must_use]
    pub fn new(from: &str) -> Self {
        Self {
            from: from.to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_TEMPLATE.to_string(),
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    #[must_use]
    pub fn render(&self, handle: &str, url: &str) -> LoginMessage {
        LoginMessage {
            to: handle.to_string(),
            from: self.from.clone(),
            subject: self.subject.clone(),
            body: self.body.replace("{handle}", handle).replace("{url}", url),
        }
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::new("no-reply@localhost")
    }
}

/// Development notifier that logs the link instead of sending it.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier {
    template: MessageTemplate,
}

impl LogNotifier {
    #[must_use]
    pub fn new(template: MessageTemplate) -> Self {
        Self { template }
    }
}

impl Notifier for LogNotifier {
    fn send<'a>(
        &'a self,
        handle: &'a str,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let message = self.template.render(handle, url);
            info!(
                to = %message.to,
                from = %message.from,
                subject = %message.subject,
                body = %message.body,
                "login link send stub"
            );
            Ok(())
        })
    }
}

/// Posts rendered messages as JSON to an HTTP mail relay.
#[derive(Debug)]
pub struct RelayNotifier {
    client: Client,
    endpoint: url::Url,
    token: Option<SecretString>,
    template: MessageTemplate,
}

impl RelayNotifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: url::Url,
        token: Option<SecretString>,
        template: MessageTemplate,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build relay HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            token,
            template,
        })
    }
}

impl Notifier for RelayNotifier {
    fn send<'a>(
        &'a self,
        handle: &'a str,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let message = self.template.render(handle, url);
            let mut request = self.client.post(self.endpoint.clone()).json(&message);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token.expose_secret());
            }
            let response = request
                .send()
                .await
                .context("Failed to reach mail relay")?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(anyhow!("mail relay answered {status}"))
            }
        })
    }
}

/// Deliver `url` to `handle` in the background, giving up after `timeout`.
pub fn spawn_delivery(
    notifier: Arc<dyn Notifier>,
    handle: String,
    url: String,
    timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(
        async move {
            if let Err(err) = deliver(notifier.as_ref(), &handle, &url, timeout).await {
                error!("{err}");
            }
        }
        .in_current_span(),
    )
}

#[instrument(skip(notifier, url))]
async fn deliver(
    notifier: &dyn Notifier,
    handle: &str,
    url: &str,
    timeout: Duration,
) -> std::result::Result<(), super::Error> {
    match tokio::time::timeout(timeout, notifier.send(handle, url)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(super::Error::Delivery(format!("{err:#}"))),
        Err(_) => Err(super::Error::Delivery(format!(
            "timed out after {}s",
            timeout.as_secs_f32()
        ))),
    }
}
