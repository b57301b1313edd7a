// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tether queue` and `tether enqueue` command implementations.
//!
//! One-shot commands run the queue offline so nothing is sent behind the
//! operator's back; only an explicit drain touches the network.

use tether_core::{QueuedRequest, RequestOptions, TetherError};
use tether_queue::{DrainSummary, QueueEvent};
use tracing::info;

use crate::runtime::Runtime;

/// Arguments of `tether enqueue`.
#[derive(Debug, Clone)]
pub struct EnqueueArgs {
    pub url: String,
    pub method: String,
    pub headers: Vec<String>,
    pub body: Option<String>,
    pub max_retries: Option<u32>,
    pub send: bool,
}

pub async fn run_list(runtime: &Runtime) -> Result<(), TetherError> {
    let pending = runtime.queue.queued_requests().await?;
    if pending.is_empty() {
        println!("queue is empty");
        return Ok(());
    }
    for request in &pending {
        println!("{}", describe(request));
    }
    println!("{} pending", pending.len());
    Ok(())
}

pub async fn run_clear(runtime: &Runtime) -> Result<(), TetherError> {
    let removed = runtime.queue.clear().await?;
    println!("removed {removed} pending request(s)");
    Ok(())
}

pub async fn run_drain(runtime: &Runtime) -> Result<(), TetherError> {
    let summary = drain_reporting(runtime).await?;
    println!("{summary}");
    Ok(())
}

pub async fn run_enqueue(runtime: &Runtime, args: EnqueueArgs) -> Result<(), TetherError> {
    let mut options = RequestOptions::new(&args.method);
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        options = options.header(name, value);
    }
    if let Some(body) = args.body {
        options = options.body(body);
    }

    runtime.queue.set_online(false);
    let id = runtime
        .queue
        .enqueue(&args.url, options, args.max_retries)
        .await?;
    println!("queued {id}");

    if args.send {
        let summary = drain_reporting(runtime).await?;
        println!("{summary}");
    }
    Ok(())
}

/// Run one pass, printing each terminal outcome as it happens.
async fn drain_reporting(runtime: &Runtime) -> Result<DrainSummary, TetherError> {
    let _events = runtime.queue.on_event(|event| match event {
        QueueEvent::Succeeded { request, response } => {
            println!("sent   {} -> {}", request.id, response.status);
        }
        QueueEvent::Failed { request, error } => {
            println!("failed {} ({error})", request.id);
        }
        QueueEvent::Exhausted {
            request,
            last_error,
        } => {
            println!(
                "gave up {} after {} attempts ({})",
                request.id,
                request.retry_count,
                last_error.as_deref().unwrap_or("no attempt made")
            );
        }
    });

    let summary = runtime
        .queue
        .drain()
        .await?
        .unwrap_or_default();
    info!(%summary, "drain finished");
    Ok(summary)
}

fn describe(request: &QueuedRequest) -> String {
    format!(
        "{id}  {method:<6} {url}  retries {retry}/{max}",
        id = request.id,
        method = request.method,
        url = request.url,
        retry = request.retry_count,
        max = request.max_retries,
    )
}

/// Split a `Name: value` header argument.
fn parse_header(raw: &str) -> Result<(String, String), TetherError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| TetherError::Config(format!("header `{raw}` is not in `Name: value` form")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(TetherError::Config(format!("header `{raw}` has an empty name")));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_arguments_split_on_first_colon() {
        assert_eq!(
            parse_header("Authorization: Bearer a:b").unwrap(),
            ("Authorization".to_string(), "Bearer a:b".to_string())
        );
        assert_eq!(
            parse_header("x-empty:").unwrap(),
            ("x-empty".to_string(), String::new())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(" : v").is_err());
    }

    #[test]
    fn describe_shows_retry_budget() {
        let request = QueuedRequest::new(
            "https://api.example.com/tasks",
            RequestOptions::new("put"),
            3,
            1_000,
        );
        let line = describe(&request);
        assert!(line.starts_with(&request.id));
        assert!(line.contains("PUT"));
        assert!(line.ends_with("retries 0/3"));
    }
}
