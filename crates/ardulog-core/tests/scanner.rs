//! Scan loop integration tests over in-memory ports.
//!
//! Time is paused, so liveness and backoff timers fast-forward whenever the
//! runtime goes idle and the tests run in milliseconds.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, DuplexStream};

use ardulog_core::config::LoggerConfig;
use ardulog_core::events::{AppEvent, EventBus};
use ardulog_core::headers::HeaderRegistry;
use ardulog_core::logfile::CsvLogWriter;
use ardulog_core::scanner::{PortOpener, ScanTiming, Scanner, ScannerHandle};

/// What a candidate port does when opened
#[derive(Clone, Copy)]
enum PortScript {
    /// Open fails
    Refuse,
    /// Opens but never sends anything
    Silent,
    /// Opens and immediately streams these bytes
    Stream(&'static [u8]),
}

/// Scripted stand-in for real serial hardware
#[derive(Clone)]
struct MockOpener {
    scripts: HashMap<String, PortScript>,
    opens: Arc<Mutex<Vec<String>>>,
    clients: Arc<Mutex<Vec<DuplexStream>>>,
}

impl MockOpener {
    fn new(scripts: &[(&str, PortScript)]) -> Self {
        Self {
            scripts: scripts
                .iter()
                .map(|(name, script)| (name.to_string(), *script))
                .collect(),
            opens: Arc::new(Mutex::new(Vec::new())),
            clients: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn opens(&self) -> Vec<String> {
        self.opens.lock().unwrap().clone()
    }

    /// Drop every device-side stream, closing open connections
    fn unplug(&self) {
        self.clients.lock().unwrap().clear();
    }
}

impl PortOpener for MockOpener {
    type Port = DuplexStream;

    async fn open(&mut self, name: &str) -> io::Result<DuplexStream> {
        self.opens.lock().unwrap().push(name.to_string());
        match self.scripts.get(name).copied().unwrap_or(PortScript::Refuse) {
            PortScript::Refuse => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no such device",
            )),
            PortScript::Silent => {
                let (client, server) = tokio::io::duplex(1024);
                self.clients.lock().unwrap().push(client);
                Ok(server)
            }
            PortScript::Stream(bytes) => {
                let (mut client, server) = tokio::io::duplex(1024);
                client.write_all(bytes).await?;
                self.clients.lock().unwrap().push(client);
                Ok(server)
            }
        }
    }
}

fn test_config(dir: &tempfile::TempDir, ports: &[&str]) -> LoggerConfig {
    LoggerConfig {
        candidate_ports: ports.iter().map(|s| s.to_string()).collect(),
        baud_rate: 9600,
        log_dir: dir.path().join("logs"),
        headers_path: dir.path().join("headers.json"),
        timing: ScanTiming::default(),
    }
}

fn start_scanner(
    config: &LoggerConfig,
    opener: MockOpener,
    events: EventBus,
) -> (ScannerHandle, CsvLogWriter) {
    let headers = HeaderRegistry::load(config.headers_path.clone());
    let writer = CsvLogWriter::new(config.log_dir.clone(), headers, events.clone());
    let (scanner, handle) = Scanner::new(config, opener, writer.clone(), events);
    tokio::spawn(scanner.run());
    (handle, writer)
}

async fn wait_for_file_lines(path: &Path, lines: usize) -> String {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if let Ok(content) = tokio::fs::read_to_string(path).await {
                if content.lines().count() >= lines {
                    return content;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("log file never reached expected length")
}

#[tokio::test(start_paused = true)]
async fn connects_to_first_live_port_after_failed_opens() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, &["pa", "pb", "pc"]);
    let opener = MockOpener::new(&[
        ("pa", PortScript::Refuse),
        ("pb", PortScript::Refuse),
        ("pc", PortScript::Stream(b"17|3|250\n")),
    ]);

    let (handle, writer) = start_scanner(&config, opener.clone(), EventBus::new());
    let mut status = handle.status();

    let snapshot = tokio::time::timeout(Duration::from_secs(60), status.wait_for(|s| s.connected))
        .await
        .expect("never connected")
        .unwrap()
        .clone();

    assert_eq!(snapshot.port.as_deref(), Some("pc"));
    // Exactly one failed open per dead candidate, no early activation
    assert_eq!(opener.opens(), vec!["pa", "pb", "pc"]);

    // The confirming line lands in the CSV
    let content = wait_for_file_lines(&writer.current_log_path(), 2).await;
    let row = content.lines().nth(1).unwrap();
    assert!(row.ends_with(",17,3,250"));
}

#[tokio::test(start_paused = true)]
async fn lost_connection_rescans_from_the_top() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, &["pa", "pb", "pc"]);
    let opener = MockOpener::new(&[
        ("pa", PortScript::Refuse),
        ("pb", PortScript::Refuse),
        ("pc", PortScript::Stream(b"1|2\n")),
    ]);

    let (handle, _writer) = start_scanner(&config, opener.clone(), EventBus::new());
    let mut status = handle.status();

    tokio::time::timeout(Duration::from_secs(60), status.wait_for(|s| s.connected))
        .await
        .expect("never connected")
        .unwrap();

    opener.unplug();

    tokio::time::timeout(Duration::from_secs(60), status.wait_for(|s| !s.connected))
        .await
        .expect("never noticed the unplug")
        .unwrap();

    tokio::time::timeout(Duration::from_secs(60), status.wait_for(|s| s.connected))
        .await
        .expect("never reconnected")
        .unwrap();

    // The rescan starts at the first candidate, not the one after the
    // port that was live
    assert_eq!(
        opener.opens(),
        vec!["pa", "pb", "pc", "pa", "pb", "pc"]
    );
}

#[tokio::test(start_paused = true)]
async fn silent_port_times_out_and_scan_moves_on() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, &["pa", "pb"]);
    let opener = MockOpener::new(&[
        ("pa", PortScript::Silent),
        ("pb", PortScript::Stream(b"5|6\n")),
    ]);

    let (handle, _writer) = start_scanner(&config, opener.clone(), EventBus::new());
    let mut status = handle.status();

    let snapshot = tokio::time::timeout(Duration::from_secs(60), status.wait_for(|s| s.connected))
        .await
        .expect("never connected")
        .unwrap()
        .clone();

    assert_eq!(snapshot.port.as_deref(), Some("pb"));
    assert_eq!(opener.opens(), vec!["pa", "pb"]);
}

#[tokio::test(start_paused = true)]
async fn dead_list_is_rescanned_indefinitely() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, &["pa", "pb"]);
    let opener = MockOpener::new(&[("pa", PortScript::Refuse), ("pb", PortScript::Refuse)]);

    let (handle, _writer) = start_scanner(&config, opener.clone(), EventBus::new());

    // Wait out several full passes over the list
    tokio::time::timeout(Duration::from_secs(120), async {
        while opener.opens().len() < 6 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("scan stopped retrying");

    assert!(!handle.current().connected);
    assert_eq!(&opener.opens()[..6], &["pa", "pb", "pa", "pb", "pa", "pb"]);
}

#[tokio::test(start_paused = true)]
async fn data_and_diagnostics_are_routed_apart() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, &["pa"]);
    let opener = MockOpener::new(&[("pa", PortScript::Stream(b"BOOT OK\n42|7\n"))]);

    let events = EventBus::new();
    let mut rx = events.subscribe();
    let (handle, writer) = start_scanner(&config, opener, events);
    let mut status = handle.status();

    tokio::time::timeout(Duration::from_secs(60), status.wait_for(|s| s.connected))
        .await
        .expect("never connected")
        .unwrap();

    // Diagnostic line reaches the event bus, not the CSV
    let mut saw_diagnostic = false;
    let mut record_fields = None;
    while record_fields.is_none() {
        match tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("event stream stalled")
            .unwrap()
        {
            AppEvent::LogMessage(m) if m.contains("BOOT OK") => saw_diagnostic = true,
            AppEvent::LogMessage(_) => {}
            AppEvent::DataRecord(record) => record_fields = Some(record.fields),
        }
    }
    assert!(saw_diagnostic);
    assert_eq!(record_fields.unwrap(), vec!["42", "7"]);

    let content = wait_for_file_lines(&writer.current_log_path(), 2).await;
    assert_eq!(content.lines().count(), 2, "header plus the one data row");
    assert!(!content.contains("BOOT OK"));
}

#[tokio::test(start_paused = true)]
async fn blank_lines_stay_off_the_event_bus() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, &["pa"]);
    // A blank line, then a data row
    let opener = MockOpener::new(&[("pa", PortScript::Stream(b"\n9|9\n"))]);

    let events = EventBus::new();
    let mut rx = events.subscribe();
    let (handle, writer) = start_scanner(&config, opener, events.clone());
    let mut status = handle.status();

    tokio::time::timeout(Duration::from_secs(60), status.wait_for(|s| s.connected))
        .await
        .expect("never connected")
        .unwrap();

    // Drain until the data record arrives; every log message seen on the
    // way must carry actual text after the port tag
    loop {
        match tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("event stream stalled")
            .unwrap()
        {
            AppEvent::LogMessage(m) => {
                assert!(!m.ends_with("[pa] "), "blank diagnostic was forwarded: {m:?}");
            }
            AppEvent::DataRecord(record) => {
                assert_eq!(record.fields, vec!["9", "9"]);
                break;
            }
        }
    }
    assert!(events.messages().iter().all(|m| !m.ends_with("[pa] ")));

    let content = wait_for_file_lines(&writer.current_log_path(), 2).await;
    assert_eq!(content.lines().count(), 2, "header plus the one data row");
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_scan() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, &["pa"]);
    let opener = MockOpener::new(&[("pa", PortScript::Refuse)]);

    let headers = HeaderRegistry::load(config.headers_path.clone());
    let events = EventBus::new();
    let writer = CsvLogWriter::new(config.log_dir.clone(), headers, events.clone());
    let (scanner, handle) = Scanner::new(&config, opener, writer, events);
    let task = tokio::spawn(scanner.run());

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(60), task)
        .await
        .expect("scanner did not stop")
        .unwrap();
}
