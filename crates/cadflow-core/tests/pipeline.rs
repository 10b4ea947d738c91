use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use cadflow_core::{
    BatchOrchestrator, ChannelBroadcaster, CoreConfig, InMemoryCluster, InMemoryStore,
    OrchestratorConfig, OrchestratorContext, Outcome, SweeperConfig, TimeoutSweeper,
};
use cadflow_model::{BatchId, BroadcastAction, JobRole, Stage};
use tokio::sync::broadcast::Receiver;

struct Pipeline {
    cluster: Arc<InMemoryCluster>,
    actions: Receiver<BroadcastAction>,
    orch: Arc<BatchOrchestrator>,
}

fn pipeline(config: CoreConfig) -> Pipeline {
    let store = Arc::new(InMemoryStore::new());
    let cluster = Arc::new(InMemoryCluster::new());
    let channel = ChannelBroadcaster::new(128);
    let actions = channel.subscribe();

    let ctx = OrchestratorContext::new(store, cluster.clone()).with_broadcaster(Arc::new(channel));
    let orch = Arc::new(BatchOrchestrator::from_context(&ctx, &config));
    Pipeline {
        cluster,
        actions,
        orch,
    }
}

fn roles(cluster: &InMemoryCluster) -> Vec<String> {
    cluster
        .submitted()
        .iter()
        .map(|spec| spec.metadata.labels["cadflow.io/role"].clone())
        .collect()
}

#[tokio::test]
async fn reader_then_worker_with_redelivery() {
    let mut p = pipeline(CoreConfig::default());
    let id = BatchId::from("batch-7f3a");

    let out = p.orch.start(&id, "s3://bucket/a.step").await.unwrap();
    assert_eq!(out, Outcome::Applied(Stage::ReaderRunning));

    let submitted = p.cluster.submitted();
    assert_eq!(submitted.len(), 1);
    let reader = &submitted[0];
    assert_eq!(reader.name(), "cad-reader-batch-7f3a");
    assert_eq!(
        reader.container(JobRole::Reader.as_str()).unwrap().image,
        "cadflow/reader:latest"
    );

    let out = p
        .orch
        .on_stage_complete(&id, Stage::ReaderRunning, vec!["parsed.json".into()])
        .await
        .unwrap();
    assert_eq!(out, Outcome::Applied(Stage::WorkerRunning));
    assert_eq!(roles(&p.cluster), vec!["reader", "worker"]);

    let worker = p.cluster.submitted().pop().unwrap();
    assert_eq!(worker.name(), "cad-worker-batch-7f3a");
    assert_eq!(
        worker.container("worker").unwrap().env.get("CADFLOW_INPUT_REFS"),
        Some(r#"["parsed.json"]"#)
    );

    let redelivered = p
        .orch
        .on_stage_complete(&id, Stage::ReaderRunning, vec!["parsed.json".into()])
        .await
        .unwrap();
    assert_eq!(redelivered, Outcome::Ignored(Stage::WorkerRunning));
    assert_eq!(roles(&p.cluster), vec!["reader", "worker"]);

    let mut seen = Vec::new();
    while let Ok(action) = p.actions.try_recv() {
        seen.push(action.action_type);
    }
    assert_eq!(seen, vec!["batch.started", "batch.advanced", "batch.ignored"]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_duplicates_apply_once() {
    let p = pipeline(CoreConfig::default());
    let id = BatchId::from("dup");
    p.orch.start(&id, "s3://bucket/a.step").await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let orch = Arc::clone(&p.orch);
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            orch.on_stage_complete(&id, Stage::ReaderRunning, vec!["parsed.json".into()])
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    for task in tasks {
        match task.await.unwrap() {
            Outcome::Applied(stage) => {
                assert_eq!(stage, Stage::WorkerRunning);
                applied += 1;
            }
            Outcome::Ignored(stage) => assert_eq!(stage, Stage::WorkerRunning),
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(roles(&p.cluster), vec!["reader", "worker"]);
}

#[tokio::test]
async fn late_completion_races_the_sweeper() {
    let config = CoreConfig {
        orchestrator: OrchestratorConfig {
            stage_timeout_ms: 50,
            ..OrchestratorConfig::default()
        },
        ..CoreConfig::default()
    };
    let p = pipeline(config);
    let id = BatchId::from("race");
    p.orch.start(&id, "s3://bucket/a.step").await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let sweep_at = SystemTime::now();

    let sweeper = TimeoutSweeper::new(
        Arc::clone(&p.orch),
        Arc::new(cadflow_core::NoopMetrics),
        SweeperConfig::default(),
    );
    let orch = Arc::clone(&p.orch);
    let completion_id = id.clone();
    let completion = tokio::spawn(async move {
        orch.on_stage_complete(&completion_id, Stage::ReaderRunning, vec!["parsed.json".into()])
            .await
            .unwrap()
    });
    let report = sweeper.sweep_once(sweep_at).await;
    let completed = completion.await.unwrap();

    let record = p.orch.state().get(&id).await.unwrap().unwrap();
    match record.stage {
        Stage::TimedOut => {
            assert_eq!(report.timed_out, 1);
            assert_eq!(completed, Outcome::Ignored(Stage::TimedOut));
        }
        Stage::WorkerRunning => {
            assert_eq!(report.timed_out, 0);
            assert_eq!(completed, Outcome::Applied(Stage::WorkerRunning));
        }
        other => panic!("unexpected stage {other}"),
    }
    assert_eq!(report.errors, 0);
}
