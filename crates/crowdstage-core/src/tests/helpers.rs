//! Shared setup utilities for the integration tests.

use std::sync::{Arc, Mutex};

use wirestore::Store;

use crate::screen::ScreenSession;
use crate::session::ControllerSession;
use crate::stage::ArcadeStage;
use crate::status::{Severity, StatusSink};

/// Installs a test-writer subscriber so tracing output surfaces in
/// failing tests. Safe to call from every test; only the first wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Messages captured from a [`StatusSink`], newest last.
pub type CapturedStatus = Arc<Mutex<Vec<(String, Severity)>>>;

/// A sink that records every message for later assertions.
pub fn capture_sink() -> (StatusSink, CapturedStatus) {
    let captured: CapturedStatus = Arc::default();
    let sink = {
        let captured = Arc::clone(&captured);
        StatusSink::new(move |message, severity| {
            captured
                .lock()
                .unwrap()
                .push((message.to_string(), severity));
        })
    };
    (sink, captured)
}

/// Whether any captured message contains `needle`.
pub fn saw_status(captured: &CapturedStatus, needle: &str) -> bool {
    captured
        .lock()
        .unwrap()
        .iter()
        .any(|(message, _)| message.contains(needle))
}

/// Starts a controller for the default room and pumps it once at t=0 so
/// the join sequence runs.
pub fn join_controller(store: &Store, name: &str) -> ControllerSession {
    init_tracing();
    let mut session = ControllerSession::start(store.connect(), "default", name, StatusSink::null());
    session.pump(0);
    session
}

/// Starts a screen contender for the default room and pumps it once so
/// the initial claim snapshot is processed.
pub fn start_screen(store: &Store, seed: u64) -> ScreenSession<ArcadeStage> {
    init_tracing();
    let mut session = ScreenSession::start(store.connect(), "default", StatusSink::null(), seed);
    session.pump();
    session
}

/// Pumps a screen `ticks` times (one fixed simulation step each while
/// authoritative).
pub fn run_ticks(screen: &mut ScreenSession<ArcadeStage>, ticks: usize) {
    for _ in 0..ticks {
        screen.pump();
    }
}
