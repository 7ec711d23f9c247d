mod cli;
mod ui;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command};
use courier::pipeline::Pipeline;
use courier::pipeline::history::HistoryFilter;
use courier::{CourierConfig, Payload, SubmitOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CourierConfig::load_from(Path::new(&cli.config))
        .with_context(|| format!("failed to load {}", cli.config))?;

    match cli.command {
        Command::Send {
            name,
            fields,
            priority,
            max_retries,
            timeout_ms,
        } => {
            let mut payload = Payload::new();
            for field in &fields {
                let (key, value) = cli::parse_field(field)?;
                payload.insert(key, value);
            }

            let pipeline = Pipeline::new(config);
            let progress = ui::SendProgress::start(&name);
            if cli.verbose {
                spawn_notification_printer(&pipeline, progress.clone());
            }

            let result = pipeline
                .submit(
                    &name,
                    payload,
                    SubmitOptions {
                        priority: priority.into(),
                        max_retries,
                        timeout_ms,
                        batchable: false,
                    },
                )
                .await;
            progress.complete(&result);
            pipeline.shutdown();
            if result.is_err() {
                std::process::exit(1);
            }
        }

        Command::Batch {
            name,
            file,
            fail_fast,
        } => {
            if fail_fast {
                config.tunables.batch_fail_fast = true;
            }
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {file}"))?;
            let payloads: Vec<Payload> = serde_json::from_str(&contents)
                .with_context(|| format!("{file} must hold a JSON array of payload objects"))?;

            let pipeline = Arc::new(Pipeline::new(config));
            let progress = ui::SendProgress::start(&name);
            if cli.verbose {
                spawn_notification_printer(&pipeline, progress.clone());
            }

            let mut handles = Vec::with_capacity(payloads.len());
            for payload in payloads {
                let pipeline = Arc::clone(&pipeline);
                let name = name.clone();
                handles.push(tokio::spawn(async move {
                    pipeline
                        .submit(
                            &name,
                            payload,
                            SubmitOptions {
                                batchable: true,
                                ..Default::default()
                            },
                        )
                        .await
                }));
            }

            let mut succeeded = 0;
            let mut failed = 0;
            for handle in handles {
                match handle.await? {
                    Ok(_) => succeeded += 1,
                    Err(_) => failed += 1,
                }
            }
            progress.finish_batch(succeeded, failed);
            pipeline.shutdown();
            if failed > 0 {
                std::process::exit(1);
            }
        }

        Command::Status { failures, limit } => {
            let pipeline = Pipeline::new(config);
            let info = pipeline.debug_info();
            let metrics = pipeline.metrics();
            let history = pipeline.history(&HistoryFilter {
                name: None,
                failures_only: failures,
                limit: Some(limit),
            });
            ui::print_status(&info, &metrics, &history);
            pipeline.shutdown();
        }
    }

    Ok(())
}

/// Forward pipeline notifications to the terminal until the pipeline
/// closes.
fn spawn_notification_printer<T: courier::transport::Transport>(
    pipeline: &Pipeline<T>,
    progress: ui::SendProgress,
) {
    let mut events = pipeline.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            progress.note(&event);
        }
    });
}
