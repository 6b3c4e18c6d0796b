//! 模拟转写
//!
//! 向模拟后端提交一个转写任务，并打印轮询过程中的每个状态
//!
//! 运行:
//!   cargo run --example simulate_transcription

use futures_util::StreamExt;
use smartsales_lib::config::AppConfig;
use smartsales_lib::jobs::{JobState, TranscriptionRequest};
use smartsales_lib::utils::init_logging;
use smartsales_lib::SmartSalesCore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    println!("=== 模拟转写 ===\n");

    let mut config = AppConfig::default();
    config.transcription.poll_interval_ms = 1_000;
    config.transcription.initial_poll_delay_ms = 0;

    let core = SmartSalesCore::simulated(&config)?;

    let request = TranscriptionRequest::new("visit-2024-05-01.wav")
        .with_object_key("audio/visit-2024-05-01.wav");
    let job_id = core.jobs().submit(&request).await?;
    println!("任务已提交: {job_id}");

    let mut states = core.jobs().observe_job(&job_id)?;
    while let Some(state) = states.next().await {
        match &state {
            JobState::InProgress { progress, status_label, .. } => {
                println!("[进行中] {progress}% {}", status_label.as_deref().unwrap_or("-"));
            }
            JobState::Completed { result, .. } => {
                println!("[完成]\n{result}");
            }
            JobState::Failed { reason, .. } => {
                println!("[失败] {reason}");
            }
            JobState::Idle => println!("[空闲]"),
        }
        if state.is_terminal() {
            break;
        }
    }

    core.shutdown().await;
    Ok(())
}
