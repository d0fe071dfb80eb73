use crate::core::error::FetchError;
use crate::core::models::{ApplicationSummary, APPLICATIONS_PATH, SERVER_HEALTHY_PATH, SERVER_UP_PATH};
use crate::core::settings::Settings;
use crate::core::transport::{RestClient, Transport};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
struct StatusOutput {
    server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    healthy: Option<bool>,
    applications: Vec<ApplicationStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    fetched_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ApplicationStatus {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    status: String,
}

pub async fn run(settings: &Settings, json: bool) -> Result<()> {
    let client = RestClient::new(&settings.server.url, settings.server.request_timeout())?;
    let output = fetch_status(&client, client.base_url()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text_output(&output);
    }

    if output.up != Some(true) {
        anyhow::bail!("Server {} is not up", output.server);
    }
    Ok(())
}

async fn fetch_status(transport: &dyn Transport, server: &str) -> StatusOutput {
    let mut errors = Vec::new();

    let up = fetch_flag(transport, SERVER_UP_PATH, &mut errors).await;
    let healthy = if up == Some(true) {
        fetch_flag(transport, SERVER_HEALTHY_PATH, &mut errors).await
    } else {
        None
    };

    let applications = match transport.get_json(APPLICATIONS_PATH, &[]).await {
        Ok(data) => match serde_json::from_value::<Vec<ApplicationSummary>>(data) {
            Ok(apps) => apps.iter().map(application_status).collect(),
            Err(e) => {
                errors.push(format!("{APPLICATIONS_PATH}: {e}"));
                Vec::new()
            }
        },
        Err(e) => {
            errors.push(e.to_string());
            Vec::new()
        }
    };

    StatusOutput {
        server: server.to_string(),
        up,
        healthy,
        applications,
        errors,
        fetched_at: Utc::now(),
    }
}

async fn fetch_flag(transport: &dyn Transport, path: &str, errors: &mut Vec<String>) -> Option<bool> {
    match transport.get_json(path, &[]).await {
        Ok(value) => value.as_bool().or_else(|| {
            errors.push(format!("{path}: expected a boolean, got {value}"));
            None
        }),
        Err(e) => {
            tracing::debug!(url = e.url(), error = %e, "Status request failed");
            errors.push(describe(&e));
            None
        }
    }
}

fn describe(error: &FetchError) -> String {
    match error {
        FetchError::Timeout { url } => format!("{url}: timed out"),
        other => other.to_string(),
    }
}

fn application_status(app: &ApplicationSummary) -> ApplicationStatus {
    ApplicationStatus {
        name: app.display_name().to_string(),
        id: app.id.clone(),
        status: app.status.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
    }
}

fn yes_no(flag: Option<bool>) -> &'static str {
    match flag {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    }
}

fn print_text_output(output: &StatusOutput) {
    println!("{}", output.server);
    println!("  {:<8} {}", "Up:", yes_no(output.up));
    println!("  {:<8} {}", "Healthy:", yes_no(output.healthy));

    println!();
    println!("Applications ({})", output.applications.len());
    for app in &output.applications {
        println!("  {:<30} {}", app.name, app.status);
    }

    for error in &output.errors {
        println!("  Error: {}", error);
    }
}
