use anyhow::Context;
use secrecy::SecretString;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::GlobalFlags;
use crate::cli::subcommands::auth::AuthLoginArgs;
use crate::commands::shared::SessionView;
use crate::context::AppContext;
use crate::output::output;

pub async fn handle(args: &AuthLoginArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let email = args.email.trim();
    if email.is_empty() {
        anyhow::bail!("auth login: --email must not be empty");
    }

    let password = match &args.password {
        Some(password) => SecretString::from(password.clone()),
        None => read_password_line().await?,
    };

    ctx.controller
        .sign_in(email, &password)
        .await
        .with_context(|| format!("auth login: sign-in failed for {email}"))?;

    output(&SessionView::from_state(&ctx.controller.snapshot()), flags.format)
}

/// One line from stdin, without the trailing newline.
async fn read_password_line() -> anyhow::Result<SecretString> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("auth login: failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        anyhow::bail!("auth login: no password given (use --password or pipe it on stdin)");
    }
    Ok(SecretString::from(password.to_string()))
}
