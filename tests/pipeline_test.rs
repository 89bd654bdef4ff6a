//! End-to-end pipeline test over the in-memory broker.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regionfan::broker::{Broker, MemoryBroker};
use regionfan::config::{ConsumerConfig, ProducerConfig, Thresholds};
use regionfan::consumer;
use regionfan::notify::collect_output_files;
use regionfan::producer::Producer;
use regionfan::signal;

const INPUT: &str = "\
Country,Region,Year,Infant_deaths,Life_expectancy,GDP_per_capita
France,Europe,2019,3.4,82.5,40000.0
Spain,Europe,2019,2.6,83.2,29000.0
Ukraine,Europe,2019,7.0,71.8,3700.0
Chad,Africa,2019,68.7,54.1,700.0
Chile,Americas,2019,5.8,80.2,25000.0
";

fn producer_config(dir: &Path) -> ProducerConfig {
    let input_path = dir.join("input.csv");
    std::fs::write(&input_path, INPUT).unwrap();
    ProducerConfig {
        broker_url: String::new(),
        input_path,
        intermediate_path: dir.join("intermediate_file.csv"),
        publish_delay: Duration::ZERO,
    }
}

fn consumer_config(dir: &Path) -> ConsumerConfig {
    ConsumerConfig {
        broker_url: String::new(),
        intermediate_path: dir.join("intermediate_file.csv"),
        output_dir: dir.join("output"),
        thresholds: Thresholds::default(),
    }
}

#[tokio::test]
async fn produce_filter_and_collect_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(MemoryBroker::new());

    let report = Producer::new(broker.clone(), producer_config(dir.path()))
        .run()
        .await
        .unwrap();
    assert_eq!(report.published, 5);
    assert_eq!(report.skipped, 0);

    // Closing the queues lets the workers drain everything buffered and
    // then stop, standing in for an interrupt once the queues are empty.
    broker.close_all();

    let config = consumer_config(dir.path());
    let (_shutdown_tx, shutdown_rx) = signal::shutdown_channel();
    let summaries = consumer::run_workers(broker, &config, shutdown_rx)
        .await
        .unwrap();

    assert_eq!(summaries.len(), 3); // Africa, Americas, Europe
    let matched: usize = summaries.iter().map(|s| s.matched).sum();
    let received: usize = summaries.iter().map(|s| s.received).sum();
    assert_eq!(received, 5);
    assert_eq!(matched, 3);

    // Europe: 3 published, 2 above both thresholds.
    let europe = std::fs::read_to_string(config.output_dir.join("Europe.csv")).unwrap();
    let lines: Vec<&str> = europe.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Country,Region,Year,GDP_per_capita,Life_expectancy",
            "France,Europe,2019,40000.0,82.5",
            "Spain,Europe,2019,29000.0,83.2",
        ]
    );

    // Americas: the Chile row, output columns reordered, text verbatim.
    let americas = std::fs::read_to_string(config.output_dir.join("Americas.csv")).unwrap();
    assert!(americas.contains("Chile,Americas,2019,25000.0,80.2"));

    // Chad is below the life-expectancy threshold; no Africa file at all.
    assert!(!config.output_dir.join("Africa.csv").exists());

    let files = collect_output_files(&config.output_dir).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Americas.csv", "Europe.csv"]);
}

#[tokio::test]
async fn interrupt_quiesces_all_workers() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(MemoryBroker::new());

    Producer::new(broker.clone(), producer_config(dir.path()))
        .run()
        .await
        .unwrap();

    let config = consumer_config(dir.path());
    let (shutdown_tx, shutdown_rx) = signal::shutdown_channel();

    let workers = {
        let broker: Arc<dyn Broker> = broker.clone();
        let config = config.clone();
        tokio::spawn(async move { consumer::run_workers(broker, &config, shutdown_rx).await })
    };

    // Let the workers drain the buffered messages, then interrupt.
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();

    let summaries = tokio::time::timeout(Duration::from_secs(2), workers)
        .await
        .expect("workers did not quiesce after shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(summaries.len(), 3);

    let europe = std::fs::read_to_string(config.output_dir.join("Europe.csv")).unwrap();
    assert_eq!(europe.lines().count(), 3);
}
