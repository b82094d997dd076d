//! Command-line interface for tvhpp.
//!
//! Provides the recorder hook (`enqueue`), the long-running consumer
//! (`consume`) and a configuration check (`config`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::adapters::{FfmpegTranscoder, SendmailMailer};
use crate::config::{Settings, DEFAULT_CONFIG_PATH};
use crate::core::{JobConsumer, JobProducer, NotificationRouter};
use crate::queue::{BeanstalkClient, QueueSettings, DEFAULT_ADDRESS, DEFAULT_TUBE};

/// tvhpp - transcode and announce tvheadend recordings
#[derive(Parser, Debug)]
#[command(name = "tvhpp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// beanstalkd address (host:port)
    #[arg(long, global = true, env = "TVHPP_BEANSTALK", default_value = DEFAULT_ADDRESS)]
    pub queue: String,

    /// Tube carrying transcoding jobs
    #[arg(long, global = true, env = "TVHPP_TUBE", default_value = DEFAULT_TUBE)]
    pub tube: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Queue a finished recording.
    ///
    /// Use as the tvheadend post-processor command:
    /// tvhpp enqueue "%f" "%c" "%t" "%e"
    Enqueue {
        /// Full path of the recording
        #[arg(allow_hyphen_values = true)]
        path: String,

        /// Channel name
        #[arg(allow_hyphen_values = true)]
        channel: String,

        /// Programme title
        #[arg(allow_hyphen_values = true)]
        title: String,

        /// Recording status ("OK" or an error description)
        #[arg(allow_hyphen_values = true)]
        status: String,
    },

    /// Run the transcoding consumer
    Consume {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Do not remove or replace original files after transcoding
        #[arg(short, long)]
        keep: bool,
    },

    /// Show resolved configuration
    Config {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let queue = QueueSettings {
            address: self.queue,
            tube: self.tube,
        };

        match self.command {
            Commands::Enqueue {
                path,
                channel,
                title,
                status,
            } => {
                enqueue(queue, &path, &channel, &title, &status).await
            }
            Commands::Consume { config, keep } => {
                consume(queue, &config, keep).await
            }
            Commands::Config { config } => {
                show_config(&config)
            }
        }
    }
}

/// Hand a recording to the queue. Never fails once arguments have parsed.
async fn enqueue(
    queue: QueueSettings,
    path: &str,
    channel: &str,
    title: &str,
    status: &str,
) -> Result<()> {
    let outcome = JobProducer::new(queue)
        .submit_recording(path, channel, title, status)
        .await;

    if !outcome.is_queued() {
        warn!(?outcome, "Recording was not queued");
    }

    Ok(())
}

/// Load configuration, connect, and drain the queue until interrupted
async fn consume(queue: QueueSettings, config_path: &Path, keep: bool) -> Result<()> {
    let mut settings = Settings::load(config_path)
        .with_context(|| format!("Cannot start consumer with {}", config_path.display()))?;
    settings.job.keep_original = keep;

    let transcoder = Arc::new(FfmpegTranscoder::with_binary_path(
        settings.transcoder_binary.clone(),
    ));
    let mailer = Arc::new(SendmailMailer::with_binary_path(
        settings.sendmail_binary.clone(),
    ));
    let router = NotificationRouter::new(settings.rules.clone(), mailer);

    let client = BeanstalkClient::open_consumer(&queue)
        .await
        .with_context(|| format!("Failed to open tube '{}' on {}", queue.tube, queue.address))?;

    info!(
        address = %queue.address,
        tube = %queue.tube,
        keep,
        "Waiting for transcoding jobs"
    );

    let mut consumer = JobConsumer::new(client, settings.job, transcoder, router);
    let processed = consumer
        .run_until(shutdown_signal())
        .await
        .context("Lost connection to the queue")?;

    info!(processed, "Consumer stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Unable to listen for SIGTERM: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Print the resolved configuration
fn show_config(config_path: &Path) -> Result<()> {
    let settings = Settings::load(config_path)?;

    println!("Config file: {}", settings.config_file.display());
    println!("From: {}", settings.rules.from_addr());
    println!("Default recipient: {}", settings.rules.default_recipient());
    println!("\nNotify list:");
    if settings.rules.recipients().is_empty() {
        println!("  (none)");
    }
    for rule in settings.rules.recipients() {
        println!("  {}", rule.address());
    }

    println!(
        "\nAudio types: {}",
        settings.job.audio_types.iter().collect::<Vec<_>>().join(", ")
    );
    println!(
        "Video types: {}",
        settings.job.video_types.iter().collect::<Vec<_>>().join(", ")
    );
    println!("\nTranscode settings:");
    println!("  audio: {}", settings.job.transcode_settings.audio);
    println!("  video: {}", settings.job.transcode_settings.video);
    println!("\nTranscoder: {}", settings.transcoder_binary);
    println!("Sendmail: {}", settings.sendmail_binary);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_arguments() {
        let cli = Cli::try_parse_from([
            "tvhpp",
            "enqueue",
            "/rec/news.ts",
            "BBC One",
            "-",
            "OK",
        ])
        .unwrap();

        match cli.command {
            Commands::Enqueue { path, title, .. } => {
                assert_eq!(path, "/rec/news.ts");
                assert_eq!(title, "-");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_consume_defaults() {
        let cli = Cli::try_parse_from(["tvhpp", "consume"]).unwrap();

        match cli.command {
            Commands::Consume { config, keep } => {
                assert_eq!(config, PathBuf::from("/etc/tvhpp.conf"));
                assert!(!keep);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_consume_keep_and_queue_override() {
        let cli = Cli::try_parse_from([
            "tvhpp",
            "consume",
            "-k",
            "-c",
            "/tmp/tvhpp.conf",
            "--queue",
            "queue.lan:11300",
        ])
        .unwrap();

        assert_eq!(cli.queue, "queue.lan:11300");
        match cli.command {
            Commands::Consume { config, keep } => {
                assert_eq!(config, PathBuf::from("/tmp/tvhpp.conf"));
                assert!(keep);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_enqueue_requires_four_arguments() {
        assert!(Cli::try_parse_from(["tvhpp", "enqueue", "/rec/news.ts", "BBC One"]).is_err());
    }
}
