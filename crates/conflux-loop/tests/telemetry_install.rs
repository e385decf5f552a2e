//! 全局订阅器只能安装一次。
#![cfg(not(loom))]

use conflux_loop::telemetry::{self, TelemetryError};

#[test]
fn second_install_reports_existing_subscriber() {
    telemetry::install().expect("首次安装应成功");
    assert!(matches!(
        telemetry::install(),
        Err(TelemetryError::SubscriberAlreadySet)
    ));
    tracing::info!("telemetry installed");
}
