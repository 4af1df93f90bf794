use anyhow::{Context, Result};
use clap::{Arg, Command};
use secrecy::SecretString;
use std::path::PathBuf;
use url::Url;

pub const ARG_MAIL_FROM: &str = "mail-from";
pub const ARG_MAIL_SUBJECT: &str = "mail-subject";
pub const ARG_MAIL_TEMPLATE: &str = "mail-template";
pub const ARG_NOTIFY_URL: &str = "notify-url";
pub const ARG_NOTIFY_TOKEN: &str = "notify-token";
pub const ARG_NOTIFY_TIMEOUT: &str = "notify-timeout";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long(ARG_MAIL_FROM)
                .help("Sender address of login messages")
                .env("PASSGATE_MAIL_FROM")
                .default_value("no-reply@localhost"),
        )
        .arg(
            Arg::new(ARG_MAIL_SUBJECT)
                .long(ARG_MAIL_SUBJECT)
                .help("Subject of login messages")
                .env("PASSGATE_MAIL_SUBJECT")
                .default_value(crate::gate::notify::DEFAULT_SUBJECT),
        )
        .arg(
            Arg::new(ARG_MAIL_TEMPLATE)
                .long(ARG_MAIL_TEMPLATE)
                .help("File with the message body; {handle} and {url} are replaced")
                .env("PASSGATE_MAIL_TEMPLATE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_NOTIFY_URL)
                .long(ARG_NOTIFY_URL)
                .help("HTTP mail relay receiving login messages as JSON; links are only logged when omitted")
                .env("PASSGATE_NOTIFY_URL"),
        )
        .arg(
            Arg::new(ARG_NOTIFY_TOKEN)
                .long(ARG_NOTIFY_TOKEN)
                .help("Bearer token sent to the mail relay")
                .env("PASSGATE_NOTIFY_TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_NOTIFY_TIMEOUT)
                .long(ARG_NOTIFY_TIMEOUT)
                .help("Seconds to wait for a login message to be delivered")
                .env("PASSGATE_NOTIFY_TIMEOUT")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub mail_from: String,
    pub mail_subject: String,
    pub mail_template: Option<PathBuf>,
    pub relay_url: Option<Url>,
    pub relay_token: Option<SecretString>,
    pub timeout_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if the relay URL is invalid.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let relay_url = matches
            .get_one::<String>(ARG_NOTIFY_URL)
            .map(|url| Url::parse(url).with_context(|| format!("Invalid notify URL: {url}")))
            .transpose()?;

        Ok(Self {
            mail_from: matches
                .get_one::<String>(ARG_MAIL_FROM)
                .cloned()
                .unwrap_or_else(|| "no-reply@localhost".to_string()),
            mail_subject: matches
                .get_one::<String>(ARG_MAIL_SUBJECT)
                .cloned()
                .unwrap_or_else(|| crate::gate::notify::DEFAULT_SUBJECT.to_string()),
            mail_template: matches.get_one::<PathBuf>(ARG_MAIL_TEMPLATE).cloned(),
            relay_url,
            relay_token: matches
                .get_one::<String>(ARG_NOTIFY_TOKEN)
                .map(|token| SecretString::from(token.as_str())),
            timeout_seconds: matches.get_one::<u64>(ARG_NOTIFY_TIMEOUT).copied().unwrap_or(10),
        })
    }
}
