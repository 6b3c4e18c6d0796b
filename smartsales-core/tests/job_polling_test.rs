//! 任务轮询协调器集成测试

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use smartsales_lib::config::TranscriptionConfig;
use smartsales_lib::jobs::{
    JobBackend, JobError, JobPoll, JobPollingCoordinator, JobResult, JobState,
    SimulatedTranscriptionBackend, TranscriptionRequest, SUBMITTED_PROGRESS,
};

// ==================== 测试后端 ====================

#[derive(Default)]
struct ScriptedBackend {
    job_id: String,
    polls: Mutex<VecDeque<JobResult<JobPoll>>>,
    result: Option<String>,
    created: AtomicUsize,
    polled: AtomicUsize,
}

impl ScriptedBackend {
    fn new(polls: Vec<JobResult<JobPoll>>) -> Self {
        Self {
            job_id: "job-1".to_string(),
            polls: Mutex::new(polls.into()),
            ..Default::default()
        }
    }

    fn with_job_id(mut self, job_id: &str) -> Self {
        self.job_id = job_id.to_string();
        self
    }

    fn with_fetched_result(mut self, result: &str) -> Self {
        self.result = Some(result.to_string());
        self
    }
}

#[async_trait]
impl JobBackend for ScriptedBackend {
    async fn create(&self, _request: &TranscriptionRequest) -> JobResult<String> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.job_id.clone())
    }

    async fn poll(&self, _job_id: &str) -> JobResult<JobPoll> {
        self.polled.fetch_add(1, Ordering::SeqCst);
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(JobPoll::with_status("RUNNING")))
    }

    async fn fetch_result(&self, job_id: &str) -> JobResult<String> {
        self.result
            .clone()
            .ok_or_else(|| JobError::Backend(format!("no result for {job_id}")))
    }
}

fn fast_config() -> TranscriptionConfig {
    TranscriptionConfig {
        poll_interval_ms: 500,
        initial_poll_delay_ms: 0,
        poll_timeout_ms: 60_000,
    }
}

fn request() -> TranscriptionRequest {
    TranscriptionRequest::new("meeting.wav").with_file_url("https://oss.example.com/meeting.wav")
}

fn progress_of(states: &[JobState]) -> Vec<u8> {
    states.iter().filter_map(JobState::progress).collect()
}

// ==================== 提交与观察 ====================

#[tokio::test(start_paused = true)]
async fn test_submit_publishes_submitted_state() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let coordinator = JobPollingCoordinator::new(backend.clone(), fast_config());

    let job_id = coordinator.submit(&request()).await.unwrap();
    assert_eq!(job_id, "job-1");
    assert_eq!(backend.created.load(Ordering::SeqCst), 1);

    match coordinator.current(&job_id) {
        Some(JobState::InProgress { progress, status_label, .. }) => {
            assert_eq!(progress, SUBMITTED_PROGRESS);
            assert_eq!(status_label.as_deref(), Some("SUBMITTED"));
        }
        other => panic!("Expected InProgress, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_observers_see_single_terminal_state() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(JobPoll::with_status("QUEUED")),
        Ok(JobPoll::with_status("TRANSCRIBING")),
        Ok(JobPoll::with_status("RUNNING").with_progress(40)),
        Ok(JobPoll::with_status("COMPLETED").with_result("# Notes\nbody")),
    ]));
    let coordinator = JobPollingCoordinator::new(backend, fast_config());

    let job_id = coordinator.submit(&request()).await.unwrap();
    let first = coordinator.observe_job(&job_id).unwrap();
    let second = coordinator.observe_job(&job_id).unwrap();

    let (first, second): (Vec<JobState>, Vec<JobState>) = tokio::join!(first.collect(), second.collect());

    for states in [&first, &second] {
        assert_eq!(states.iter().filter(|s| s.is_terminal()).count(), 1);
        assert!(states.last().unwrap().is_terminal());
        match states.last().unwrap() {
            JobState::Completed { result, status_label, .. } => {
                assert_eq!(result, "# Notes\nbody");
                assert_eq!(status_label.as_deref(), Some("COMPLETED"));
            }
            other => panic!("Expected Completed, got {:?}", other),
        }

        let progress = progress_of(states);
        assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", progress);
    }
}

#[tokio::test(start_paused = true)]
async fn test_late_observer_joins_mid_progress() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(JobPoll::with_status("QUEUED")),
        Ok(JobPoll::with_status("TRANSCRIBING")),
        Ok(JobPoll::with_status("RUNNING").with_progress(40)),
        Ok(JobPoll::with_status("COMPLETED").with_result("# Notes\nbody")),
    ]));
    let coordinator = JobPollingCoordinator::new(backend, fast_config());

    let job_id = coordinator.submit(&request()).await.unwrap();
    let early = tokio::spawn(coordinator.observe_job(&job_id).unwrap().collect::<Vec<JobState>>());

    tokio::time::sleep(Duration::from_millis(700)).await;
    let joined_at = coordinator.current(&job_id).unwrap();
    assert!(!joined_at.is_terminal());
    let late: Vec<JobState> = coordinator.observe_job(&job_id).unwrap().collect().await;
    let early = early.await.unwrap();

    // 后加入的观察者先收到当前进度
    assert_eq!(late.first(), Some(&joined_at));
    assert!(late.len() < early.len());

    for states in [&early, &late] {
        assert_eq!(states.iter().filter(|s| s.is_terminal()).count(), 1);
        assert!(matches!(states.last(), Some(JobState::Completed { result, .. }) if result == "# Notes\nbody"));

        let progress = progress_of(states);
        assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", progress);
    }
    assert_eq!(early.last(), late.last());
}

#[tokio::test(start_paused = true)]
async fn test_progress_never_regresses() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(JobPoll::with_status("TRANSCRIBING")),
        Ok(JobPoll::with_status("RUNNING").with_progress(40)),
    ]));
    let coordinator = JobPollingCoordinator::new(backend, fast_config());

    let job_id = coordinator.submit(&request()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert_eq!(coordinator.current(&job_id).and_then(|s| s.progress()), Some(75));
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_carries_reason() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(
        JobPoll::with_status("failed").with_error("audio too short")
    )]));
    let coordinator = JobPollingCoordinator::new(backend, fast_config());

    let job_id = coordinator.submit(&request()).await.unwrap();
    let states: Vec<JobState> = coordinator.observe_job(&job_id).unwrap().collect().await;

    match states.last() {
        Some(JobState::Failed { reason, .. }) => assert_eq!(reason, "audio too short"),
        other => panic!("Expected Failed, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_completed_without_result_fetches_it() {
    let backend = Arc::new(
        ScriptedBackend::new(vec![Ok(JobPoll::with_status("SUCCEEDED"))]).with_fetched_result("fetched"),
    );
    let coordinator = JobPollingCoordinator::new(backend, fast_config());

    let job_id = coordinator.submit(&request()).await.unwrap();
    let states: Vec<JobState> = coordinator.observe_job(&job_id).unwrap().collect().await;

    assert_eq!(states.last(), Some(&JobState::Completed {
        job_id: "job-1".into(),
        result: "fetched".into(),
        status_label: Some("SUCCEEDED".into()),
    }));
}

#[tokio::test(start_paused = true)]
async fn test_poll_error_fails_job() {
    let backend = Arc::new(ScriptedBackend::new(vec![Err(JobError::Backend("503".into()))]));
    let coordinator = JobPollingCoordinator::new(backend, fast_config());

    let job_id = coordinator.submit(&request()).await.unwrap();
    let states: Vec<JobState> = coordinator.observe_job(&job_id).unwrap().collect().await;

    match states.last() {
        Some(JobState::Failed { reason, .. }) => assert!(reason.contains("503")),
        other => panic!("Expected Failed, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_poll_timeout_fails_job() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let config = TranscriptionConfig {
        poll_timeout_ms: 1_000,
        ..fast_config()
    };
    let coordinator = JobPollingCoordinator::new(backend.clone(), config);

    let job_id = coordinator.submit(&request()).await.unwrap();
    let states: Vec<JobState> = coordinator.observe_job(&job_id).unwrap().collect().await;

    match states.last() {
        Some(JobState::Failed { reason, .. }) => {
            assert_eq!(reason, &JobError::Timeout(1_000).to_string());
        }
        other => panic!("Expected Failed, got {:?}", other),
    }
    assert!(backend.polled.load(Ordering::SeqCst) >= 2);
}

// ==================== 恢复与清理 ====================

#[tokio::test(start_paused = true)]
async fn test_observing_unknown_job_resumes_polling() {
    let backend = Arc::new(
        ScriptedBackend::new(vec![Ok(JobPoll::with_status("COMPLETED").with_result("restored"))])
            .with_job_id("unused"),
    );
    let coordinator = JobPollingCoordinator::new(backend.clone(), fast_config());

    let states: Vec<JobState> = coordinator.observe_job("tingwu-restored").unwrap().collect().await;

    assert_eq!(states.first(), Some(&JobState::Idle));
    assert_eq!(states.last().and_then(JobState::job_id), Some("tingwu-restored"));
    assert!(states.last().unwrap().is_terminal());
    assert_eq!(backend.created.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_observing_finished_job_replays_terminal() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(JobPoll::with_status("COMPLETED").with_result("done"))]));
    let coordinator = JobPollingCoordinator::new(backend.clone(), fast_config());

    let job_id = coordinator.submit(&request()).await.unwrap();
    let _: Vec<JobState> = coordinator.observe_job(&job_id).unwrap().collect().await;
    let polled = backend.polled.load(Ordering::SeqCst);

    let replay: Vec<JobState> = coordinator.observe_job(&job_id).unwrap().collect().await;
    assert_eq!(replay.len(), 1);
    assert!(replay[0].is_terminal());
    assert_eq!(backend.polled.load(Ordering::SeqCst), polled);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_observer_keeps_polling() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(JobPoll::with_status("QUEUED")),
        Ok(JobPoll::with_status("COMPLETED").with_result("done")),
    ]));
    let coordinator = JobPollingCoordinator::new(backend, fast_config());

    let job_id = coordinator.submit(&request()).await.unwrap();
    drop(coordinator.observe_job(&job_id).unwrap());
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(coordinator.current(&job_id).unwrap().is_terminal());
    assert_eq!(coordinator.prune_finished(), 1);
    assert!(coordinator.current(&job_id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_polling() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let coordinator = JobPollingCoordinator::new(backend.clone(), fast_config());

    let job_id = coordinator.submit(&request()).await.unwrap();
    let observer = coordinator.observe_job(&job_id).unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    coordinator.shutdown();
    let polled = backend.polled.load(Ordering::SeqCst);

    // 已有观察者收到失败状态后结束
    let states: Vec<JobState> = tokio::time::timeout(Duration::from_secs(5), observer.collect())
        .await
        .expect("observer should end after shutdown");
    match states.last() {
        Some(JobState::Failed { reason, .. }) => assert_eq!(reason, &JobError::ShutDown.to_string()),
        other => panic!("Expected Failed, got {:?}", other),
    }

    // 关闭后不再接受观察和提交
    assert_eq!(coordinator.observe_job(&job_id).err(), Some(JobError::ShutDown));
    assert_eq!(coordinator.observe_job("other-job").err(), Some(JobError::ShutDown));
    assert_eq!(coordinator.submit(&request()).await, Err(JobError::ShutDown));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.polled.load(Ordering::SeqCst), polled);
    assert!(coordinator.current(&job_id).unwrap().is_terminal());
    assert_eq!(backend.created.load(Ordering::SeqCst), 1);
}

// ==================== 请求校验 ====================

#[tokio::test(start_paused = true)]
async fn test_invalid_request_is_rejected_before_create() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let coordinator = JobPollingCoordinator::new(backend.clone(), fast_config());

    let result = coordinator.submit(&TranscriptionRequest::new("meeting.wav")).await;
    assert!(matches!(result, Err(JobError::InvalidRequest(_))));
    assert_eq!(backend.created.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_blank_job_id_is_rejected() {
    let backend = Arc::new(ScriptedBackend::new(vec![]).with_job_id("  "));
    let coordinator = JobPollingCoordinator::new(backend, fast_config());

    assert_eq!(coordinator.submit(&request()).await, Err(JobError::MissingJobId));
}

// ==================== 模拟后端 ====================

#[tokio::test(start_paused = true)]
async fn test_simulated_backend_end_to_end() {
    let coordinator = JobPollingCoordinator::new(
        Arc::new(SimulatedTranscriptionBackend::new()),
        TranscriptionConfig::default(),
    );

    let job_id = coordinator
        .submit(&TranscriptionRequest::new("visit.m4a").with_object_key("audio/visit.m4a"))
        .await
        .unwrap();
    let states: Vec<JobState> = coordinator.observe_job(&job_id).unwrap().collect().await;

    match states.last() {
        Some(JobState::Completed { result, .. }) => assert!(result.contains("visit.m4a")),
        other => panic!("Expected Completed, got {:?}", other),
    }
    let progress = progress_of(&states);
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
}
