//! Process memory watchdog
//!
//! Samples this process's RSS on an interval and warns when it crosses the
//! configured threshold. Large repositories are parsed in memory, so a
//! creeping RSS is the first sign of trouble.

use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, warn};

const SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

pub async fn monitor_rss(warn_mb: u64) {
    let Ok(pid) = sysinfo::get_current_pid() else {
        warn!("Memory monitoring disabled: cannot resolve own pid");
        return;
    };

    let mut system = System::new();

    loop {
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        if let Some(process) = system.process(pid) {
            let rss_mb = process.memory() / (1024 * 1024);
            if rss_mb > warn_mb {
                warn!(rss_mb, warn_mb, "Worker RSS above threshold");
            } else {
                debug!(rss_mb, "Worker RSS sample");
            }
        }
        tokio::time::sleep(SAMPLE_INTERVAL).await;
    }
}
