use anyhow::bail;
use crossbeam_channel::{bounded, unbounded};
use log::{Level, LevelFilter, Log, Metadata, Record};
use sentiflow::pipeline::{CancelToken, Step};
use std::sync::Mutex;

// Captures every log line so tests can check what a step reported.
struct Capture;

static LINES: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());
static LOGGER: Capture = Capture;

impl Log for Capture {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        LINES
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

fn install() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(LevelFilter::Debug);
}

fn warned(needle: &str) -> bool {
    LINES
        .lock()
        .unwrap()
        .iter()
        .any(|(level, line)| *level == Level::Warn && line.contains(needle))
}

// --- undeliverable errors ---

#[test]
fn test_error_logged_when_error_receiver_gone() {
    install();
    let ctx = CancelToken::new();
    let (tx, rx) = unbounded();
    tx.send(1_u32).unwrap();
    drop(tx);
    let (out_tx, _out_rx) = unbounded::<u32>();
    let (err_tx, err_rx) = unbounded();
    drop(err_rx);

    let report = Step::new("orphaned", |_: u32| -> anyhow::Result<u32> {
        bail!("disk full on write")
    })
    .limit(1)
    .run(&ctx, rx, out_tx, err_tx);

    assert_eq!(report.failed, 1);
    assert_eq!(report.discarded, 1);
    assert!(warned("disk full on write"));
    assert!(warned("step 'orphaned' item #1"));
}

#[test]
fn test_error_logged_when_discarded_after_cancel() {
    install();
    let ctx = CancelToken::new();
    let (tx, rx) = unbounded();
    tx.send(1_u32).unwrap();
    drop(tx);
    let (out_tx, _out_rx) = unbounded::<u32>();
    let (err_tx, _err_rx) = bounded(1);
    err_tx.send(anyhow::anyhow!("earlier failure")).unwrap();

    let report = Step::with_context("late", |ctx: &CancelToken, _: u32| -> anyhow::Result<u32> {
        ctx.cancel("shutting down");
        bail!("quota exceeded while stopping")
    })
    .limit(1)
    .run(&ctx, rx, out_tx, err_tx);

    assert_eq!(report.failed, 1);
    assert_eq!(report.discarded, 1);
    assert!(warned("quota exceeded while stopping"));
}
