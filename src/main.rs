use std::sync::Arc;

use regionfan::broker::AmqpBroker;
use regionfan::config::{ConsumerConfig, ProducerConfig, SmtpConfig};
use regionfan::notify::Notifier;
use regionfan::producer::Producer;
use regionfan::{consumer, signal};
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage (SMTP).
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Log to stderr and to a file, like the original pipeline's file logger.
    let file_appender = tracing_appender::rolling::never("logs", "regionfan.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(file_writer.and(std::io::stderr))
        .with_ansi(false)
        .with_target(false)
        .init();

    match std::env::args().nth(1).as_deref() {
        Some("produce") => run_producer().await,
        Some("consume") => run_consumer().await,
        _ => {
            eprintln!("Usage: regionfan <produce|consume>");
            std::process::exit(2);
        }
    }
}

async fn run_producer() -> anyhow::Result<()> {
    let config = ProducerConfig::from_env()?;

    eprintln!("regionfan producer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Broker: {}", config.broker_url);
    eprintln!("   Input: {}", config.input_path.display());
    eprintln!("   Intermediate: {}", config.intermediate_path.display());
    eprintln!(
        "   Publish delay: {}s\n",
        config.publish_delay.as_secs()
    );

    let broker = Arc::new(AmqpBroker::connect(&config.broker_url).await?);
    let report = Producer::new(broker, config).run().await?;

    eprintln!(
        "\nPublished {} records ({} skipped).",
        report.published, report.skipped
    );
    Ok(())
}

async fn run_consumer() -> anyhow::Result<()> {
    let config = ConsumerConfig::from_env()?;

    // Notification config is required up front: failing after hours of
    // consuming would lose the export emails.
    let smtp = SmtpConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  EMAIL_FROM, EMAIL_TO and EMAIL_PASSWORD must be set.");
        std::process::exit(1);
    });

    eprintln!("regionfan consumer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Broker: {}", config.broker_url);
    eprintln!("   Output: {}", config.output_dir.display());
    eprintln!("   To exit press CTRL+C\n");

    let broker = Arc::new(AmqpBroker::connect(&config.broker_url).await?);

    let (shutdown_tx, shutdown_rx) = signal::shutdown_channel();
    let _listener = signal::spawn_ctrl_c_listener(shutdown_tx);

    let summaries = consumer::run_workers(broker, &config, shutdown_rx).await?;
    let matched: usize = summaries.iter().map(|s| s.matched).sum();
    tracing::info!(
        workers = summaries.len(),
        matched,
        "All workers joined"
    );

    let sent = Notifier::new(smtp).send_exports(&config.output_dir)?;
    eprintln!("\nSent {sent} notification email(s). Goodbye.");
    Ok(())
}
