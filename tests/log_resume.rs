// tests/log_resume.rs

mod common;
use crate::common::builders::{AllocBuilder, JobBuilder, at, exited, running};
use crate::common::{Captured, FakeNomad, api, eventually, fast_watch, init_tracing, settings, with_timeout};

use std::error::Error;

use nomad_watch::cli::WatchCommand;
use nomad_watch::config::WatchSettings;
use nomad_watch::nomad::model::{ClientStatus, JobStatus};
use nomad_watch::types::{LogKind, OutputSet, OutputStream};

type TestResult = Result<(), Box<dyn Error>>;

const ALLOC: &str = "fedcba9876543210";

fn stdout_lines(out: &Captured) -> Vec<String> {
    out.lines()
        .into_iter()
        .filter(|l| l.contains(":O "))
        .collect()
}

#[tokio::test]
async fn reconnecting_reader_neither_skips_nor_repeats_bytes() -> TestResult {
    init_tracing();
    let fake = FakeNomad::new();
    fake.put_job(JobBuilder::new("web").group("g", &["main"]).build());
    fake.put_allocation(
        AllocBuilder::new(ALLOC, "web")
            .status(ClientStatus::Running)
            .task("main", running(at(0)))
            .build(),
    );
    // The stream is cut in the middle of a line.
    fake.append_log(ALLOC, "main", LogKind::Stdout, "one\ntw");

    let api = api(&fake);
    let settings = settings(WatchSettings {
        lines: -1,
        outputs: OutputSet::from_selectors(&[OutputStream::Stdout]),
        ..fast_watch()
    });
    let out = Captured::default();
    let handle = {
        let out = out.clone();
        tokio::spawn(async move {
            nomad_watch::watch(api, &WatchCommand::Job { jobid: "web".into() }, false, &settings, out).await
        })
    };

    with_timeout(eventually(|| !stdout_lines(&out).is_empty())).await;
    fake.break_log_streams(ALLOC, "main", LogKind::Stdout);
    fake.append_log(ALLOC, "main", LogKind::Stdout, "o\nthree\n");
    with_timeout(eventually(|| stdout_lines(&out).len() >= 3)).await;

    fake.put_allocation(
        AllocBuilder::new(ALLOC, "web")
            .status(ClientStatus::Complete)
            .task("main", exited(at(0), 0))
            .build(),
    );
    let mut job = fake.job_now("default", "web").ok_or("job vanished")?;
    job.status = JobStatus::Dead;
    fake.put_job(job);
    let outcome = with_timeout(handle).await??;

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(
        stdout_lines(&out),
        vec!["fedcba:g:main:O one", "fedcba:g:main:O two", "fedcba:g:main:O three"]
    );
    Ok(())
}
