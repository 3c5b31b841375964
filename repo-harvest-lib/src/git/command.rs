use super::LOG_TARGET;
use crate::Result;
use core::time::Duration;
use ohno::{IntoAppError, bail};
use regex::Regex;
use std::process::{Output, Stdio};
use std::sync::LazyLock;
use tokio::process::Command;
use url::Url;

/// Username the service accepts alongside a token embedded in a remote URL.
const TOKEN_USER: &str = "x-access-token";

/// The user-info part of a URL's authority, up to and including its last `@`.
static URL_CREDENTIALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*://)[^/?#\s'"]+@"#).expect("invalid regex"));

/// Replace credentials embedded in any URL within `text` with `***`.
#[must_use]
pub fn mask_secret(text: &str) -> String {
    URL_CREDENTIALS.replace_all(text, "${scheme}***@").into_owned()
}

/// The clone URL of `owner/repo` under `base`, with `token` embedded when given.
pub fn remote_url(base: &Url, owner: &str, repo: &str, token: Option<&str>) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    let mut url = base
        .join(&format!("{owner}/{repo}.git"))
        .into_app_err_with(|| format!("building remote URL for {owner}/{repo}"))?;

    if let Some(token) = token {
        if url.set_username(TOKEN_USER).is_err() || url.set_password(Some(token)).is_err() {
            bail!("cannot embed credentials in '{}'", mask_secret(url.as_str()));
        }
    }
    Ok(url)
}

/// Run git with `args`, killing it if it runs longer than `timeout`.
pub async fn run_git(args: &[&str], timeout: Duration) -> Result<Output> {
    let printable = mask_secret(&args.join(" "));
    log::trace!(target: LOG_TARGET, "git {printable}");

    let child = Command::new("git")
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .into_app_err("could not spawn git command")?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e).into_app_err_with(|| format!("'git {printable}' failed to run")),
        Err(_) => bail!("'git {printable}' timed out after {} seconds", timeout.as_secs()),
    }
}

/// Fail with git's (masked) stderr if the command did not succeed.
pub fn check_git_output(output: &Output, operation: &str) -> Result<()> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{operation} failed: {}", mask_secret(stderr.trim()));
    }
    Ok(())
}
