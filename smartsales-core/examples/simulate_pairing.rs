//! 模拟配网
//!
//! 使用模拟配网器走一遍 选择设备 → 配网 → 心跳 → 地址发现 的流程
//!
//! 运行:
//!   cargo run --example simulate_pairing

use std::time::Duration;

use smartsales_lib::config::AppConfig;
use smartsales_lib::connectivity::{BlePeripheral, ConnectionSnapshot, WifiCredentials};
use smartsales_lib::utils::init_logging;
use smartsales_lib::SmartSalesCore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    println!("=== 模拟配网 ===\n");

    let core = SmartSalesCore::simulated(&AppConfig::default())?;
    let mut states = core.connection().subscribe();
    let mut urls = core.endpoint().subscribe();

    let peripheral = BlePeripheral::new("AA:BB:CC:DD:EE:01", "BT311-Demo", -52).with_profile("bt311");
    core.connection()
        .start_pairing(&peripheral, WifiCredentials::new("SmartSales-Office", "12345678"))
        .await?;

    let deadline = tokio::time::sleep(Duration::from_secs(6));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = ConnectionSnapshot::from(&*states.borrow_and_update());
                println!("[状态] {:<16} 进度: {:?}", snapshot.state, snapshot.progress);
            }
            changed = urls.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("[地址] {:?}", urls.borrow_and_update().clone());
            }
            _ = &mut deadline => break,
        }
    }

    let status = core.connection().query_network_status().await?;
    println!("\n设备网络: {status:?}");

    core.shutdown().await;
    println!("\n=== 完成 ===");
    Ok(())
}
