//! 通过真实HTTP连接驱动Worker的端到端测试

use std::sync::Arc;
use std::time::Duration;

use taskly_core::WorkerConfig;
use taskly_domain::{HeartbeatResponse, SubmitTaskRequest, SubmitTaskResponse, TaskState};
use taskly_infrastructure::MetricsCollector;
use taskly_testing_utils::MockCoordinatorClient;
use taskly_worker::{ShellExecutor, Worker};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

struct RunningWorker {
    url: String,
    coordinator: Arc<MockCoordinatorClient>,
    shutdown_tx: broadcast::Sender<()>,
    handle: tokio::task::JoinHandle<taskly_core::SchedulerResult<()>>,
}

async fn start_worker(queue_capacity: usize) -> RunningWorker {
    let config = WorkerConfig {
        pool_size: 2,
        queue_capacity,
        shutdown_grace_seconds: 5,
        ..WorkerConfig::default()
    };
    let coordinator = Arc::new(MockCoordinatorClient::new());
    let worker = Worker::new(
        config,
        coordinator.clone(),
        Arc::new(ShellExecutor::new()),
        MetricsCollector::new(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(worker.serve(listener, url.clone(), shutdown_rx));

    RunningWorker {
        url,
        coordinator,
        shutdown_tx,
        handle,
    }
}

async fn wait_for_statuses(
    coordinator: &MockCoordinatorClient,
    task_id: Uuid,
    expected: &[TaskState],
) {
    for _ in 0..100 {
        if coordinator.statuses_for(task_id).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "任务 {task_id} 的状态为 {:?}，期望 {expected:?}",
        coordinator.statuses_for(task_id).await
    );
}

async fn submit(client: &reqwest::Client, url: &str, command: &str) -> (Uuid, reqwest::StatusCode) {
    let task_id = Uuid::new_v4();
    let response = client
        .post(format!("{url}/rpc/tasks"))
        .json(&SubmitTaskRequest {
            task_id,
            command: command.to_string(),
        })
        .send()
        .await
        .unwrap();
    (task_id, response.status())
}

#[tokio::test]
async fn test_worker_registers_on_start() {
    let worker = start_worker(8).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(worker.coordinator.registrations().await, vec![worker.url.clone()]);

    let heartbeat: HeartbeatResponse = reqwest::get(format!("{}/rpc/heartbeat", worker.url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(heartbeat.alive);
    assert_eq!(heartbeat.worker_id, Some(1));

    worker.shutdown_tx.send(()).unwrap();
    worker.handle.await.unwrap().unwrap();
    assert_eq!(worker.coordinator.deregistrations().await, vec![1]);
}

#[tokio::test]
async fn test_exit_status_drives_reported_milestones() {
    let worker = start_worker(8).await;
    let client = reqwest::Client::new();

    let (ok_id, status) = submit(&client, &worker.url, "exit 0").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    let (failed_id, status) = submit(&client, &worker.url, "exit 3").await;
    assert_eq!(status, reqwest::StatusCode::OK);

    wait_for_statuses(
        &worker.coordinator,
        ok_id,
        &[TaskState::Started, TaskState::Completed],
    )
    .await;
    wait_for_statuses(
        &worker.coordinator,
        failed_id,
        &[TaskState::Started, TaskState::Failed],
    )
    .await;

    worker.shutdown_tx.send(()).unwrap();
    worker.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_redelivered_task_runs_once() {
    let worker = start_worker(8).await;
    let client = reqwest::Client::new();
    let request = SubmitTaskRequest {
        task_id: Uuid::new_v4(),
        command: "true".to_string(),
    };

    for _ in 0..2 {
        let response: SubmitTaskResponse = client
            .post(format!("{}/rpc/tasks", worker.url))
            .json(&request)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(response.accepted);
    }

    wait_for_statuses(
        &worker.coordinator,
        request.task_id,
        &[TaskState::Started, TaskState::Completed],
    )
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(worker.coordinator.statuses_for(request.task_id).await.len(), 2);

    worker.shutdown_tx.send(()).unwrap();
    worker.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_drains_running_tasks() {
    let worker = start_worker(8).await;
    let client = reqwest::Client::new();

    let (task_id, status) = submit(&client, &worker.url, "sleep 0.3").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(50)).await;

    worker.shutdown_tx.send(()).unwrap();
    worker.handle.await.unwrap().unwrap();

    assert_eq!(
        worker.coordinator.statuses_for(task_id).await,
        vec![TaskState::Started, TaskState::Completed]
    );
}
