use crate::gate::{
    self, Gateway, InMemoryAuthorizer, LogNotifier, MessageTemplate, Notifier, ProtectionRule,
    RelayNotifier, SigningIdentity,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{fs, path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub site_url: Url,
    pub base_path: String,
    pub expires_seconds: u64,
    pub resources: Vec<String>,
    pub handles: Vec<String>,
    pub root: PathBuf,
    pub key_file: Option<PathBuf>,
    pub cookie_secure: Option<bool>,
    pub mail_from: String,
    pub mail_subject: String,
    pub mail_template: Option<PathBuf>,
    pub notify_url: Option<Url>,
    pub notify_token: Option<SecretString>,
    pub notify_timeout_seconds: u64,
}

fn load_identity(key_file: Option<&PathBuf>) -> Result<SigningIdentity> {
    if let Some(path) = key_file {
        let pem = fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file: {}", path.display()))?;
        return SigningIdentity::from_pem(&pem)
            .with_context(|| format!("Invalid signing key in {}", path.display()));
    }

    warn!("no key file given, generating an ephemeral signing key; tokens will not survive a restart");
    SigningIdentity::generate().context("Failed to generate signing key")
}

fn protection_rule(args: &Args) -> Result<ProtectionRule> {
    let mut rule = ProtectionRule::new(args.site_url.clone())
        .with_base_path(&args.base_path)
        .with_lifetime(Duration::from_secs(args.expires_seconds))
        .with_resources(args.resources.iter().cloned())
        .with_handles(args.handles.iter().cloned())
        .with_delivery_timeout(Duration::from_secs(args.notify_timeout_seconds));
    if let Some(secure) = args.cookie_secure {
        rule = rule.with_cookie_secure(secure);
    }
    rule.normalize().context("Invalid protection rule")
}

fn message_template(args: &Args) -> Result<MessageTemplate> {
    let template = MessageTemplate::new(&args.mail_from).with_subject(&args.mail_subject);
    match &args.mail_template {
        Some(path) => {
            let body = fs::read_to_string(path)
                .with_context(|| format!("Failed to read mail template: {}", path.display()))?;
            Ok(template.with_body(&body))
        }
        None => Ok(template),
    }
}

fn notifier(args: &Args, template: MessageTemplate) -> Result<Arc<dyn Notifier>> {
    match &args.notify_url {
        Some(url) => {
            info!(relay = %url, "delivering login links through mail relay");
            let relay = RelayNotifier::new(
                url.clone(),
                args.notify_token.clone(),
                template,
                Duration::from_secs(args.notify_timeout_seconds),
            )?;
            Ok(Arc::new(relay))
        }
        None => {
            warn!("no notify URL given, login links are only logged");
            Ok(Arc::new(LogNotifier::new(template)))
        }
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing key or configuration is unusable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let identity = Arc::new(load_identity(args.key_file.as_ref())?);
    let rule = protection_rule(&args)?;
    let authorizer = Arc::new(InMemoryAuthorizer::new(rule.handles().iter()));
    if authorizer.is_empty() {
        warn!("no handles configured, every login request will be ignored");
    }
    let notifier = notifier(&args, message_template(&args)?)?;

    info!(
        base_path = rule.base_path(),
        resources = ?rule.resources(),
        handles = authorizer.len(),
        "gate configured"
    );

    let gateway = Gateway::new(rule, identity, authorizer, notifier);

    gate::new(args.port, gateway, args.root).await
}
