use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use url::Url;

pub const ARG_SITE_URL: &str = "site-url";
pub const ARG_BASE_PATH: &str = "base-path";
pub const ARG_EXPIRES: &str = "expires";
pub const ARG_RESOURCE: &str = "resource";
pub const ARG_HANDLE: &str = "handle";
pub const ARG_ROOT: &str = "root";
pub const ARG_KEY_FILE: &str = "key-file";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SITE_URL)
                .long(ARG_SITE_URL)
                .help("Public URL of the site, used to build login links")
                .env("PASSGATE_SITE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_BASE_PATH)
                .long(ARG_BASE_PATH)
                .help("Base path of the login, signout and pub.cer endpoints")
                .env("PASSGATE_BASE_PATH")
                .default_value("/"),
        )
        .arg(
            Arg::new(ARG_EXPIRES)
                .long(ARG_EXPIRES)
                .help("Token lifetime in seconds")
                .env("PASSGATE_EXPIRES")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_RESOURCE)
                .long(ARG_RESOURCE)
                .help("Protected path prefix or glob, repeat or separate with commas")
                .env("PASSGATE_RESOURCES")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .default_value("/"),
        )
        .arg(
            Arg::new(ARG_HANDLE)
                .long(ARG_HANDLE)
                .help("Handle allowed to request a login link, repeat or separate with commas")
                .env("PASSGATE_HANDLES")
                .action(ArgAction::Append)
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_ROOT)
                .long(ARG_ROOT)
                .help("Directory served behind the gate")
                .env("PASSGATE_ROOT")
                .default_value("public")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_KEY_FILE)
                .long(ARG_KEY_FILE)
                .help("PEM RSA private key (PKCS#8 or PKCS#1); a key is generated when omitted")
                .env("PASSGATE_KEY_FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Force the Secure cookie attribute (default: on when the site URL is https)")
                .env("PASSGATE_COOKIE_SECURE")
                .value_parser(clap::value_parser!(bool)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub site_url: Url,
    pub base_path: String,
    pub expires_seconds: u64,
    pub resources: Vec<String>,
    pub handles: Vec<String>,
    pub root: PathBuf,
    pub key_file: Option<PathBuf>,
    pub cookie_secure: Option<bool>,
}

impl Options {
    /// # Errors
    /// Returns an error if the site URL is not a valid absolute URL.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let site_url = matches
            .get_one::<String>(ARG_SITE_URL)
            .context("missing required argument: --site-url")?;
        let site_url =
            Url::parse(site_url).with_context(|| format!("Invalid site URL: {site_url}"))?;

        Ok(Self {
            site_url,
            base_path: matches
                .get_one::<String>(ARG_BASE_PATH)
                .cloned()
                .unwrap_or_else(|| "/".to_string()),
            expires_seconds: matches.get_one::<u64>(ARG_EXPIRES).copied().unwrap_or(86_400),
            resources: matches
                .get_many::<String>(ARG_RESOURCE)
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
            handles: matches
                .get_many::<String>(ARG_HANDLE)
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
            root: matches
                .get_one::<PathBuf>(ARG_ROOT)
                .cloned()
                .unwrap_or_else(|| PathBuf::from("public")),
            key_file: matches.get_one::<PathBuf>(ARG_KEY_FILE).cloned(),
            cookie_secure: matches.get_one::<bool>(ARG_COOKIE_SECURE).copied(),
        })
    }
}
