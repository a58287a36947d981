//! Fetch command - route one request through the cache

use super::Settings;
use crate::cli::args::FetchArgs;
use crate::error::{ShellcacheError, ShellcacheResult};
use crate::fetch::{Method, Request};
use crate::router::FetchOutcome;
use crate::ui;
use tokio::fs;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, settings: &Settings) -> ShellcacheResult<()> {
    let worker = settings.worker().await?;
    let request = Request::parse_get(&args.url)?.with_method(Method::parse(&args.method));

    match worker.handle_fetch(&request).await? {
        FetchOutcome::PassThrough => {
            ui::step_info(&format!(
                "{} {} is not a cached resource; passed through",
                request.method, request.url
            ));
        }
        FetchOutcome::Respond { response, source } => {
            ui::key_value("source", &source.to_string());
            ui::key_value_status("status", &response.status.to_string(), response.is_ok());
            ui::key_value("bytes", &response.body.len().to_string());

            if let Some(path) = args.output {
                fs::write(&path, &response.body).await.map_err(|e| {
                    ShellcacheError::io(format!("writing {}", path.display()), e)
                })?;
                ui::step_ok(&format!("Body written to {}", path.display()));
            }
        }
    }

    Ok(())
}
