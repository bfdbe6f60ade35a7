// UI layer: prompts (dialoguer), the wait spinner (indicatif) and the text
// rendering of results. Rendering functions return strings so the command
// handlers decide where output goes and tests can check it.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Result;
use crossterm::style::Stylize;
use dialoguer::{Confirm, Input, Password};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::DEFAULT_HOST;
use crate::credentials::{CredentialStore, Credentials};
use crate::models::{AppSummary, Group, ScanResult};
use crate::session::Session;

const VERDICT_PASS_SYMBOL: &str = "\u{1F60A}"; // smiling face with smiling eyes
const VERDICT_FAIL_SYMBOL: &str = "\u{1F622}"; // crying face
const VERDICT_VERIFY_SYMBOL: &str = "\u{1F440}"; // eyes

/// Separator printed between results of a multi-file scan.
pub const RULE: &str = "==================================================";

/// The service's short verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictKind {
    Pass,
    Vulns,
    Verify,
    Unknown,
}

impl VerdictKind {
    pub fn from_short(short: &str) -> Self {
        match short {
            "Pass" => VerdictKind::Pass,
            "Vulns" => VerdictKind::Vulns,
            "Verify" => VerdictKind::Verify,
            _ => VerdictKind::Unknown,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            VerdictKind::Pass => VERDICT_PASS_SYMBOL,
            VerdictKind::Vulns => VERDICT_FAIL_SYMBOL,
            VerdictKind::Verify => VERDICT_VERIFY_SYMBOL,
            VerdictKind::Unknown => "??",
        }
    }
}

/// Human-readable analysis report.
pub fn render_result(result: &ScanResult, color: bool) -> String {
    let mut out = Vec::new();
    out.push(heading("Analysis results", color));
    out.push(format!(
        "    File:   {}",
        result.filename.as_deref().unwrap_or("")
    ));
    out.push(format!(
        "    SHA1:   {}",
        result.sha1sum.as_deref().unwrap_or("")
    ));
    if let Some(url) = result.report_url.as_deref().filter(|u| !u.is_empty()) {
        out.push(format!("    Report: {}", url));
    }

    if !result.is_ready() {
        out.push("Result not yet ready.".to_string());
        return out.join("\n");
    }

    let labels = result.component_labels();
    if labels.is_empty() {
        out.push("No 3rd party or open source components detected.".to_string());
    } else {
        out.push(String::new());
        out.push(heading("Components:", color));
        out.push(indented_list(&labels));
    }

    let licenses = result.license_names();
    if !licenses.is_empty() {
        out.push(String::new());
        out.push(heading("License analysis:", color));
        out.push(indented_list(&licenses));
    }

    let (kind, detailed) = match result.verdict() {
        Some(v) => (VerdictKind::from_short(&v.short), v.detailed.as_str()),
        None => (VerdictKind::Unknown, ""),
    };
    let summary = format!(
        "    {} out of {} components contain known vulnerabilities {}",
        result.vulnerable_components(),
        result.components.len(),
        kind.symbol()
    );
    out.push(String::new());
    out.push(heading("Vulnerability analysis:", color));
    out.push(if color {
        match kind {
            VerdictKind::Pass => summary.green().to_string(),
            VerdictKind::Vulns => summary.red().to_string(),
            VerdictKind::Verify => summary.yellow().to_string(),
            VerdictKind::Unknown => summary,
        }
    } else {
        summary
    });
    out.push(format!("    {}", detailed));
    out.join("\n")
}

/// Per-file lines printed right after an upload.
pub fn render_upload(result: &ScanResult) -> String {
    let status = if result.is_ready() {
        "READY; scanned before"
    } else {
        "queued for scanning"
    };
    format!(
        " - SHA1: {}\n - {} ({})",
        result.sha1sum.as_deref().unwrap_or(""),
        result.report_url.as_deref().unwrap_or(""),
        status
    )
}

pub fn render_groups(groups: &[Group]) -> String {
    let mut out = vec![
        "Available groups".to_string(),
        format!("{:8} {}", "ID", "Name"),
    ];
    out.extend(groups.iter().map(|g| format!("{:<8} {}", g.id, g.name)));
    out.join("\n")
}

pub fn render_apps(apps: &[AppSummary]) -> String {
    if apps.is_empty() {
        return "No apps found.".to_string();
    }
    let mut out = vec![format!("{:5}  {}", "ID", "Application name")];
    out.extend(apps.iter().map(|a| format!("{:5}  {}", a.id.to_string(), a.name)));
    out.join("\n")
}

fn heading(text: &str, color: bool) -> String {
    if color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

fn indented_list(items: &BTreeSet<String>) -> String {
    let joined: Vec<&str> = items.iter().map(String::as_str).collect();
    format!("    {}", joined.join(" "))
}

/// Spinner shown on stderr while a result is still busy.
pub fn wait_spinner(id_or_sha1: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message(format!("Waiting for result for {}", id_or_sha1));
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

pub fn confirm(prompt: &str) -> Result<bool> {
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

/// Ask whether to use the managed service or an appliance address.
pub fn prompt_host() -> Result<String> {
    let managed = Confirm::new()
        .with_prompt(format!("Use Protecode SC managed service {}/?", DEFAULT_HOST))
        .default(true)
        .interact()?;
    if managed {
        return Ok(DEFAULT_HOST.to_string());
    }
    let host: String = Input::new()
        .with_prompt("Enter URI (https://YOUR-APPLIANCE)")
        .interact_text()?;
    Ok(host)
}

/// Prompt for a username and password, offering to save them.
pub fn update_login_credentials<S: CredentialStore>(session: &mut Session<S>) -> Result<Credentials> {
    let mut input = Input::<String>::new();
    input.with_prompt("Login username/email-address");
    if let Some(previous) = session.config().username() {
        input.default(previous.to_string());
    }
    let username = input.interact_text()?;
    // `Password` hides input in terminal for passwords.
    let password = Password::new().with_prompt("Login password").interact()?;
    let credentials = Credentials::new(username, password);

    if confirm("Save information and do not ask again?")? {
        session.save_credentials(&credentials)?;
        println!("Saved login details.");
    }
    Ok(credentials)
}
