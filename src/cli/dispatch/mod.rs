//! Map parsed arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{gate, notify, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if an argument cannot be parsed into its domain type.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let gate_opts = gate::Options::parse(matches)?;
    let notify_opts = notify::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        site_url: gate_opts.site_url,
        base_path: gate_opts.base_path,
        expires_seconds: gate_opts.expires_seconds,
        resources: gate_opts.resources,
        handles: gate_opts.handles,
        root: gate_opts.root,
        key_file: gate_opts.key_file,
        cookie_secure: gate_opts.cookie_secure,
        mail_from: notify_opts.mail_from,
        mail_subject: notify_opts.mail_subject,
        mail_template: notify_opts.mail_template,
        notify_url: notify_opts.relay_url,
        notify_token: notify_opts.relay_token,
        notify_timeout_seconds: notify_opts.timeout_seconds,
    }))
}
