//! Common test utilities
//!
//! This module is shared across all integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use tubevault::core::types::JobId;
use tubevault::events::{ChannelEvent, Subscription};
use tubevault::storage::create_pool;
use tubevault::testing::ScriptedRunner;
use tubevault::{DownloadService, EventChannel, Settings};

pub const COOKIES: &str = "# Netscape HTTP Cookie File\n\
    .youtube.com\tTRUE\t/\tTRUE\t1999999999\tSID\tabc\n";

/// Scratch directory, file-backed database and a service wired to a scripted runner
pub struct TestEnvironment {
    pub dir: TempDir,
    pub runner: Arc<ScriptedRunner>,
    pub service: DownloadService,
}

impl TestEnvironment {
    pub fn new(with_cookies: bool) -> Self {
        Self::with_runner(ScriptedRunner::new(), with_cookies)
    }

    pub fn with_runner(runner: ScriptedRunner, with_cookies: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Settings::rooted_at(dir.path());
        std::fs::create_dir_all(&settings.downloads_dir).expect("downloads dir");
        if with_cookies {
            std::fs::write(&settings.cookies_file, COOKIES).expect("cookies");
        }

        let pool = create_pool(&settings.database_path).expect("pool");
        let runner = Arc::new(runner);
        let service = DownloadService::new(runner.clone(), pool, EventChannel::new(64), settings);

        Self { dir, runner, service }
    }
}

/// Collects events for `job_id` until its lifecycle event arrives
pub async fn events_until_lifecycle(subscription: &mut Subscription, job_id: JobId) -> Vec<ChannelEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), subscription.recv())
            .await
            .expect("timed out waiting for events")
            .expect("subscription closed");
        if event.job_id() != job_id {
            continue;
        }
        let done = matches!(event, ChannelEvent::Lifecycle(_));
        seen.push(event);
        if done {
            return seen;
        }
    }
}
