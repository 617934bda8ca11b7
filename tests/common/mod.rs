#![allow(dead_code)]

pub use nomad_watch_test_utils::{FakeNomad, builders, init_tracing, with_timeout};

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nomad_watch::config::{NomadSettings, Settings, WatchSettings};
use nomad_watch::logs::LineFormats;
use nomad_watch::nomad::NomadApi;
use nomad_watch::source::BackoffPolicy;

/// Watch settings with every timer shortened for tests.
pub fn fast_watch() -> WatchSettings {
    WatchSettings {
        lines_timeout: Duration::from_millis(50),
        shutdown_timeout: Duration::from_millis(300),
        drain_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(20),
        backoff: BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(40)),
        max_retries: 5,
        ..Default::default()
    }
}

pub fn settings(watch: WatchSettings) -> Settings {
    Settings {
        nomad: NomadSettings::default(),
        watch,
        format: LineFormats::default(),
    }
}

pub fn api(fake: &Arc<FakeNomad>) -> Arc<dyn NomadApi> {
    fake.clone()
}

/// Output buffer that can be inspected after the printer is done with it.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Poll `cond` every 5ms until it holds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    while !cond() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
