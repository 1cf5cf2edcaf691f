//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试 (消息信封、配置格式)
//! - CSV → Controller → Broker 端到端测试 (内存 / 文件 transport)
//! - 随机 ack / reject 场景下的计数不变量

#[cfg(test)]
mod contract_tests {
    use contracts::{DetectionPayload, DetectionRecord, GpsFix, Message};

    #[test]
    fn test_message_envelope_shape() {
        let record = DetectionRecord::with_id(
            "det-1",
            DetectionPayload {
                frame_number: 12,
                timestamp_sec: 0.4,
                pixel_u: 10.0,
                pixel_v: 20.0,
                confidence: 0.7,
                class_name: "stop sign".to_string(),
                video_name: None,
                gps: GpsFix {
                    vehicle_lat: Some(43.79),
                    vehicle_lon: Some(-79.31),
                    heading: None,
                    recording_timestamp: None,
                },
            },
            "vehicle-001",
            "session-1",
        );

        let message = Message::from_record(&record, "traffic-sign-detections").unwrap();
        assert_eq!(message.key, "det-1");
        assert_eq!(message.header("vehicle_id"), Some("vehicle-001"));
        assert_eq!(message.header("session_id"), Some("session-1"));
        assert_eq!(message.header("class_name"), Some("stop sign"));

        let body: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(body["detection_id"], "det-1");
        assert_eq!(body["frame_number"], 12);
        assert!(body["object_lat"].is_null());
        assert!(body.get("ingested_at").is_some());
    }

    #[test]
    fn test_example_config_round_trips() {
        let toml = r#"
            [pipeline]
            mode = "batch"
            workerCount = 4
            maxRetries = 3

            [source]
            csv_path = "detections.csv"
            vehicle_id = "vehicle-042"

            [broker]
            topic = "signs"
            transport = "file"
            log_path = "out/signs.jsonl"
        "#;
        let config =
            config_loader::ConfigLoader::load_from_str(toml, config_loader::ConfigFormat::Toml)
                .unwrap();
        assert_eq!(config.pipeline.worker_count, 4);
        assert_eq!(config.pipeline.max_retries, 3);

        let json = config_loader::ConfigLoader::to_json(&config).unwrap();
        let back =
            config_loader::ConfigLoader::load_from_str(&json, config_loader::ConfigFormat::Json)
                .unwrap();
        assert_eq!(back.broker.topic, "signs");
        assert_eq!(back.source.vehicle_id, "vehicle-042");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;

    use broker::{FaultPlan, LogLine, MemoryBroker, MemoryBrokerConfig};
    use contracts::{IngestConfig, IngestMode, TransportKind};
    use ingestion::{RecordSource, StreamEnd, VecRecordSource};
    use pipeline::PipelineController;
    use rand::Rng;

    const HEADER: &str = "frame_number,timestamp_sec,u,v,confidence,class_name,video_name,vehicle_lat,vehicle_lon,heading";

    fn write_csv(path: &Path, rows: usize, bad_every: usize) {
        let mut file = std::fs::File::create(path).unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for i in 0..rows {
            if bad_every > 0 && i % bad_every == 0 {
                // confidence out of range
                writeln!(file, "{i},{i}.0,1,1,1.5,stop sign,drive.mp4,43.7,-79.3,90").unwrap();
            } else {
                writeln!(file, "{i},{i}.5,640,360,0.87,speed limit 40,drive.mp4,43.7,-79.3,")
                    .unwrap();
            }
        }
    }

    fn config(mode: IngestMode, workers: usize) -> IngestConfig {
        let mut config = IngestConfig::default();
        config.pipeline.mode = mode;
        config.pipeline.worker_count = workers;
        config.pipeline.base_backoff_ms = 1;
        config.pipeline.flush_timeout_secs = 10;
        config.source.session_id = Some("e2e-session".to_string());
        config
    }

    /// CSV -> Controller -> MemoryBroker, every mode and pool size
    #[tokio::test]
    async fn test_e2e_csv_all_acked() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("detections.csv");
        write_csv(&csv, 300, 0);

        for mode in [IngestMode::Batch, IngestMode::Streaming] {
            for workers in [1, 4, 16] {
                let broker = MemoryBroker::start(MemoryBrokerConfig::default());
                let mut cfg = config(mode, workers);
                cfg.source.csv_path = Some(csv.clone());

                let controller = PipelineController::new(cfg).with_transport(broker.clone());
                let source = controller.open_source().unwrap();
                let report = controller.run(source).await.unwrap();

                assert!(report.is_success(), "{mode} with {workers} workers");
                assert_eq!(report.metrics.acked, 300);
                assert_eq!(report.metrics.failed, 0);
                assert_eq!(report.source.rows_dropped, 0);
                assert_eq!(broker.delivered_count(), 300);
            }
        }
    }

    #[tokio::test]
    async fn test_e2e_malformed_rows_dropped_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("detections.csv");
        write_csv(&csv, 100, 10);

        let broker = MemoryBroker::start(MemoryBrokerConfig::default());
        let mut cfg = config(IngestMode::Streaming, 4);
        cfg.source.csv_path = Some(csv);
        let controller = PipelineController::new(cfg).with_transport(broker.clone());
        let source = controller.open_source().unwrap();
        let report = controller.run(source).await.unwrap();

        assert_eq!(report.source.rows_dropped, 10);
        assert_eq!(report.source.records_emitted, 90);
        assert_eq!(report.metrics.sent, 90);
        assert_eq!(report.metrics.acked, 90);
        assert_eq!(report.source_end, Some(StreamEnd::Exhausted));

        let first = &broker.delivered()[0].message;
        assert_eq!(first.header("session_id"), Some("e2e-session"));
        assert_eq!(first.header("class_name"), Some("speed limit 40"));
        let record = first.decode().unwrap();
        assert_eq!(record.vehicle_id, "vehicle-001");
        assert!(record.has_gps());
        assert_eq!(record.heading, None);
    }

    /// CSV -> Controller -> FileLogBroker built from configuration
    #[tokio::test]
    async fn test_e2e_file_transport() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("detections.csv");
        let log = dir.path().join("broker/detections.jsonl");
        write_csv(&csv, 50, 0);

        let mut cfg = config(IngestMode::Batch, 4);
        cfg.source.csv_path = Some(csv);
        cfg.broker.transport = TransportKind::File;
        cfg.broker.log_path = Some(log.clone());
        config_loader::ConfigLoader::validate(&cfg).unwrap();

        let controller = PipelineController::new(cfg);
        let source = controller.open_source().unwrap();
        let report = controller.run(source).await.unwrap();
        assert!(report.is_success());

        let lines: Vec<LogLine> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 50);
        assert!(lines.iter().all(|l| l.topic == contracts::DEFAULT_TOPIC));
        assert!(lines.iter().all(|l| l.body["session_id"] == "e2e-session"));
    }

    /// Randomized ack / reject / transient / async-failure mix
    #[tokio::test]
    async fn test_e2e_random_faults_invariants() {
        let mut rng = rand::rng();
        let records: Vec<_> = (0..400)
            .map(|i| {
                contracts::DetectionRecord::with_id(
                    format!("det-{i}"),
                    contracts::DetectionPayload {
                        frame_number: i,
                        timestamp_sec: i as f64 * 0.04,
                        pixel_u: 1.0,
                        pixel_v: 1.0,
                        confidence: 0.6,
                        class_name: "yield".to_string(),
                        video_name: None,
                        gps: contracts::GpsFix::default(),
                    },
                    "vehicle-001",
                    "e2e-session",
                )
            })
            .collect();

        let mut faults = FaultPlan::default();
        let mut permanent = 0u64;
        for record in &records {
            let key = record.detection_id.clone();
            match rng.random_range(0..20) {
                0 | 1 => {
                    faults = faults.reject(key);
                    permanent += 1;
                }
                2 => {
                    faults = faults.fail_async(key);
                    permanent += 1;
                }
                3..=5 => faults = faults.transient(key, rng.random_range(1..=3)),
                _ => {}
            }
        }

        let broker = MemoryBroker::start(MemoryBrokerConfig {
            faults,
            ..Default::default()
        });
        let mode = if rng.random_bool(0.5) {
            IngestMode::Batch
        } else {
            IngestMode::Streaming
        };
        let controller =
            PipelineController::new(config(mode, 8)).with_transport(broker.clone());
        let report = controller
            .run(VecRecordSource::new("random", records))
            .await
            .unwrap();

        let m = report.metrics;
        assert_eq!(m.sent, 400);
        assert_eq!(m.failed, permanent);
        assert_eq!(m.acked, 400 - permanent);
        assert_eq!(m.pending, 0);
        assert!(m.sent >= m.acked + m.failed);
        assert_eq!(report.is_success(), permanent == 0);
        assert_eq!(broker.delivered_count() as u64, m.acked);
    }

    /// Counters read mid-run never show negative pending
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_e2e_invariant_holds_during_run() {
        let broker = MemoryBroker::start(MemoryBrokerConfig {
            ack_latency: Duration::from_micros(200),
            ..Default::default()
        });
        let controller =
            PipelineController::new(config(IngestMode::Streaming, 8)).with_transport(broker);
        let metrics = controller.metrics_handle();

        let records = (0..2000)
            .map(|i| {
                contracts::DetectionRecord::ingest(
                    contracts::DetectionPayload {
                        frame_number: i,
                        timestamp_sec: i as f64,
                        pixel_u: 0.0,
                        pixel_v: 0.0,
                        confidence: 1.0,
                        class_name: "stop sign".to_string(),
                        video_name: None,
                        gps: contracts::GpsFix::default(),
                    },
                    "vehicle-001",
                    "e2e-session",
                )
            })
            .collect();
        let run = tokio::spawn(controller.run(VecRecordSource::new("bulk", records)));

        while !run.is_finished() {
            let snap = metrics.snapshot();
            assert!(snap.sent >= snap.acked + snap.failed, "{snap}");
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let report = run.await.unwrap().unwrap();
        assert!(report.is_success());
        assert_eq!(report.metrics.acked, 2000);
    }

    #[test]
    fn test_source_trait_objects() {
        let mut source: Box<dyn RecordSource> = Box::new(VecRecordSource::new("empty", vec![]));
        assert!(source.next_record().unwrap().is_none());
        assert_eq!(source.name(), "empty");
    }
}
