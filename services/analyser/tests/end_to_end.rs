//! Generator and analyser over a real loopback connection

use std::time::Duration;
use tempfile::tempdir;
use vectorlink_analyser::{AnalysisReport, AnalyserService};
use vectorlink_codec::encode_vector;
use vectorlink_config::LinkConfig;
use vectorlink_generator::GeneratorService;
use vectorlink_network::{FramedConnection, TcpConnection};

async fn session(mut config: LinkConfig) -> (AnalysisReport, vectorlink_generator::GeneratorSummary) {
    config.network.port = 0;
    let generator = GeneratorService::new(&config).unwrap();
    let listener = TcpConnection::listen(generator.addr()).await.unwrap();
    config.network.port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move { generator.run_with_listener(listener).await });

    let analyser = AnalyserService::new(&config).unwrap();
    let report = tokio::time::timeout(Duration::from_secs(30), analyser.run())
        .await
        .unwrap()
        .unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    (report, summary)
}

fn fast_config(output: std::path::PathBuf) -> LinkConfig {
    let mut config = LinkConfig::default();
    config.network.connect_max_attempts = 5;
    config.network.connect_retry_delay_ms = 50;
    config.generator.vector_size = 8;
    config.generator.seed = Some(11);
    config.generator.send_calls = 5_000;
    config.analyser.vectors_to_receive = 1;
    config.analyser.batch_size = 100;
    config.analyser.consumer_pacing_ms = 5;
    config.analyser.output_path = output;
    config
}

#[tokio::test]
async fn test_clean_session_writes_report() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("results.json");

    let (report, summary) = session(fast_config(output.clone())).await;

    assert_eq!(report.communication.rates.len(), 10);
    assert_eq!(report.communication.dropped_vectors, 0);
    assert_eq!(report.communication.sequence_faults, 0);
    assert_eq!(report.communication.frames_received, 1_000);
    assert!(report.communication.bytes_received > 0);
    assert_eq!(report.communication.discarded_frames, 0);
    assert!(report.communication.complete);
    assert!(report.communication.analytics.mean > 0.0);
    assert_eq!(report.matrices.len(), 10);
    for matrix in &report.matrices {
        assert_eq!(matrix.matrix.len(), 100);
        assert!(matrix.matrix.iter().all(|row| row.len() == 8));
        assert_eq!(matrix.mean.len(), 8);
        assert_eq!(matrix.standard_deviation.len(), 8);
    }

    assert!(summary.vectors_sent >= 1_000);
    assert_eq!(summary.sequences_skipped, 0);

    let written = AnalysisReport::read_from(&output).unwrap();
    assert_eq!(written, report);
}

#[tokio::test]
async fn test_noisy_session_counts_single_drops() {
    let dir = tempdir().unwrap();
    let mut config = fast_config(dir.path().join("results.json"));
    config.generator.noisy_mode = true;
    config.generator.noise_cycle_ms = 40;
    config.generator.noise_min_delay_ms = 20;

    let (report, summary) = session(config).await;

    assert_eq!(report.matrices.len(), 10);
    assert!(report.communication.dropped_vectors >= 1);
    assert_eq!(report.communication.sequence_faults, 0);
    assert!(summary.sequences_skipped >= report.communication.dropped_vectors);
}

#[tokio::test]
async fn test_early_disconnect_writes_partial_report() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("results.json");
    let mut config = fast_config(output.clone());
    config.network.port = 0;

    // A sender that stops half way through the third batch
    let mut listener = TcpConnection::listen(config.network.socket_addr().unwrap())
        .await
        .unwrap();
    config.network.port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        listener.accept().await.unwrap();
        let mut framed = FramedConnection::new(listener);
        for i in 0..250 {
            let payload = encode_vector(&[i as f64; 8]).unwrap();
            framed.send_frame(&payload).await.unwrap();
        }
        framed.close().await;
    });

    let analyser = AnalyserService::new(&config).unwrap();
    let err = tokio::time::timeout(Duration::from_secs(30), analyser.run())
        .await
        .unwrap()
        .unwrap_err();
    assert!(format!("{:#}", err).contains("Batch pipeline failed"));
    server.await.unwrap();

    let written = AnalysisReport::read_from(&output).unwrap();
    assert!(!written.communication.complete);
    assert_eq!(written.matrices.len(), 2);
    assert_eq!(written.communication.rates.len(), 2);
    assert_eq!(written.communication.frames_received, 250);
    assert_eq!(written.communication.discarded_frames, 50);
    assert_eq!(written.matrices[1].mean, vec![149.5; 8]);
}
