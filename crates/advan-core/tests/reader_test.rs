#![allow(clippy::unwrap_used)]
// Integration tests for `Reader` against a mocked control plane.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use advan_core::{
    CoreError, MemoryBank, Read, Reader, ReaderListener, ReaderSettings, SessionState,
};

const DEVICE: &str = "AdvanReader-m4-100";

// ── Helpers ─────────────────────────────────────────────────────────

fn device_path(suffix: &str) -> String {
    format!("/devices/{DEVICE}/{suffix}")
}

fn ok(data: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(
        "<response><status>OK</status><data>{data}</data></response>"
    ))
}

fn settings_for(server: &MockServer) -> ReaderSettings {
    let mut settings = ReaderSettings::for_host("127.0.0.1");
    settings.port = server.address().port();
    settings
}

async fn mount_get(server: &MockServer, suffix: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(device_path(suffix)))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mount every endpoint `apply_settings` touches.
async fn mount_device(server: &MockServer, modes: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<response><msg-version>2.3.1</msg-version><data><devices>\
             <device><id>{DEVICE}</id><serial>SN-42</serial><family>AdvanReader-100</family></device>\
             </devices></data></response>"
        )))
        .mount(server)
        .await;

    let modes: String = modes
        .iter()
        .map(|m| format!("<readMode><name>{m}</name></readMode>"))
        .collect();
    mount_get(
        server,
        "deviceModes",
        ok(&format!("<entries><entry><readModes>{modes}</readModes></entry></entries>")),
    )
    .await;
    mount_get(server, "stop", ok("")).await;
    mount_get(server, "reader/parameter/RF_WRITE_POWER/30.0", ok("")).await;
    mount_get(server, "reader/parameter/DATA_GPI_NUMBER", ok("<result>4</result>")).await;
    mount_get(server, "reader/parameter/DATA_GPO_NUMBER", ok("<result>2</result>")).await;

    Mock::given(method("PUT"))
        .and(path(device_path("antennas")))
        .respond_with(ok(""))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path(device_path("reader/parameter/GEN2_SESSION")))
        .and(body_string("S1"))
        .respond_with(ok(""))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path(device_path("reader/parameter/GEN2_TARGET")))
        .and(body_string("AB"))
        .respond_with(ok(""))
        .expect(1)
        .mount(server)
        .await;
}

// ── Settings ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_apply_settings_configures_device() {
    let server = MockServer::start().await;
    mount_device(&server, &["AUTONOMOUS", "EPC_ONLY"]).await;
    Mock::given(method("GET"))
        .and(path(device_path("start")))
        .respond_with(ok(""))
        .expect(0)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let reader = Reader::new(settings.clone()).unwrap();
    reader.apply_settings(settings).await.unwrap();

    assert_eq!(reader.gpi_count(), 4);
    assert_eq!(reader.gpo_count(), 2);
    assert_eq!(reader.serial().as_deref(), Some("SN-42"));
    assert_eq!(reader.model_name().as_deref(), Some("AdvanReader-100"));
}

#[tokio::test]
async fn test_invalid_settings_send_nothing() {
    let server = MockServer::start().await;
    let reader = Reader::new(settings_for(&server)).unwrap();

    let mut bad = settings_for(&server);
    bad.antennas = vec![1, 2];
    bad.tx_power = vec![10.0];
    bad.rx_sensitivity = vec![-70.0, -70.0];

    let result = reader.apply_settings(bad).await;
    assert!(matches!(result, Err(CoreError::Configuration { .. })));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_autonomous_mode_is_rejected() {
    let server = MockServer::start().await;
    mount_device_without_rf(&server).await;

    let settings = settings_for(&server);
    let reader = Reader::new(settings.clone()).unwrap();
    let result = reader.apply_settings(settings).await;

    assert!(matches!(result, Err(CoreError::Configuration { .. })));
}

/// Discovery, stop and modes only, with no autonomous mode offered.
async fn mount_device_without_rf(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<response><data><devices><device><id>{DEVICE}</id></device></devices></data></response>"
        )))
        .mount(server)
        .await;
    mount_get(server, "stop", ok("")).await;
    mount_get(
        server,
        "deviceModes",
        ok("<entries><entry><readModes><readMode><name>EPC_ONLY</name></readMode></readModes></entry></entries>"),
    )
    .await;
    Mock::given(method("PUT"))
        .and(path(device_path("antennas")))
        .respond_with(ok(""))
        .expect(0)
        .mount(server)
        .await;
}

// ── Inventory / GPIO ────────────────────────────────────────────────

#[tokio::test]
async fn test_start_read_sets_baseline() {
    let server = MockServer::start().await;
    mount_device(&server, &["AUTONOMOUS"]).await;
    mount_get(&server, "activeReadMode", ok("<result>AUTONOMOUS</result>")).await;
    Mock::given(method("GET"))
        .and(path(device_path("start")))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<response><status>OK</status><ts>1700000000000</ts></response>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let reader = Reader::new(settings.clone()).unwrap();
    reader.apply_settings(settings).await.unwrap();
    reader.start_read().await.unwrap();

    assert!(reader.is_reading());
    assert_eq!(reader.engine().session_state(), SessionState::Reading);
    assert_eq!(reader.engine().baseline(), 1_700_000_000_000);
}

#[tokio::test]
async fn test_gpo_slice_is_one_based() {
    let server = MockServer::start().await;
    mount_device(&server, &["AUTONOMOUS"]).await;
    for (line, state) in [(1, true), (2, false)] {
        Mock::given(method("GET"))
            .and(path(device_path(&format!("setGPO/{line}/{state}"))))
            .respond_with(ok(""))
            .expect(1)
            .mount(&server)
            .await;
    }

    let settings = settings_for(&server);
    let reader = Reader::new(settings.clone()).unwrap();
    reader.apply_settings(settings).await.unwrap();
    reader.set_gpo_slice(&[true, false]).await.unwrap();
}

#[tokio::test]
async fn test_gpio_requires_device() {
    let server = MockServer::start().await;
    let reader = Reader::new(settings_for(&server)).unwrap();

    let result = reader.set_gpo(1, true).await;
    assert!(matches!(result, Err(CoreError::NotConnected)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_reconfigure_stops_inventory() {
    let server = MockServer::start().await;
    mount_device(&server, &["AUTONOMOUS"]).await;
    mount_get(&server, "activeReadMode", ok("<result>AUTONOMOUS</result>")).await;
    Mock::given(method("GET"))
        .and(path(device_path("start")))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<response><status>OK</status><ts>1700000000000</ts></response>",
        ))
        .expect(2)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let reader = Reader::new(settings.clone()).unwrap();
    reader.apply_settings(settings.clone()).await.unwrap();
    reader.start_read().await.unwrap();

    Mock::given(method("PUT"))
        .and(path(device_path("antennas")))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<response><status>ERROR</status><msg>antenna 3 missing</msg></response>",
        ))
        .with_priority(1)
        .mount(&server)
        .await;

    let result = reader.apply_settings(settings).await;
    assert!(matches!(result, Err(CoreError::Device { .. })));
    assert!(!reader.is_reading());
    assert_eq!(reader.engine().session_state(), SessionState::Idle);

    // queueing work starts RF again
    reader
        .read_data(MemoryBank::Tid, 0, 2, None)
        .await
        .unwrap();
    assert_eq!(reader.engine().session_state(), SessionState::Reading);
}

// ── Connection ──────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    reads: Mutex<Vec<String>>,
    lost: AtomicUsize,
}

impl ReaderListener for Recorder {
    fn on_read(&self, read: &Read) {
        self.reads.lock().unwrap().push(read.epc.clone());
    }

    fn on_connection_lost(&self) {
        self.lost.fetch_add(1, Ordering::SeqCst);
    }
}

fn frame(body: &str) -> String {
    format!(
        "ADVANNET\nContent-Length:{}\nContent-Type:text/xml\n\n{body}",
        body.len()
    )
}

const INVENTORY: &str = "<inventory><data><inventory><items>\
     <item><ts>1700000000500</ts><data><hexepc>aabbccdd</hexepc></data></item>\
     </items></inventory></data></inventory>";

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn connected_reader(server: &MockServer) -> (Reader, Arc<Recorder>, TcpListener) {
    mount_device(server, &["AUTONOMOUS"]).await;
    mount_get(server, "activeReadMode", ok("<result>AUTONOMOUS</result>")).await;
    mount_get(
        server,
        "start",
        ResponseTemplate::new(200).set_body_string(
            "<response><status>OK</status><ts>1700000000000</ts></response>",
        ),
    )
    .await;

    let events = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut settings = settings_for(server);
    settings.event_port = events.local_addr().unwrap().port();

    let recorder = Arc::new(Recorder::default());
    let reader = Reader::new(settings).unwrap();
    reader.set_listener(recorder.clone());
    reader.connect().await.unwrap();
    (reader, recorder, events)
}

#[tokio::test]
async fn test_connect_streams_reads_until_disconnect() {
    let server = MockServer::start().await;
    let (reader, recorder, events) = connected_reader(&server).await;

    assert!(reader.is_connected());
    assert_eq!(reader.serial().as_deref(), Some("SN-42"));

    let (mut socket, _) = events.accept().await.unwrap();
    reader.start_read().await.unwrap();
    socket.write_all(frame(INVENTORY).as_bytes()).await.unwrap();

    wait_until("inventory read", || !recorder.reads.lock().unwrap().is_empty()).await;
    assert_eq!(*recorder.reads.lock().unwrap(), vec!["AABBCCDD"]);

    reader.disconnect().await;
    assert!(!reader.is_connected());
    assert_eq!(reader.engine().session_state(), SessionState::Idle);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.lost.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_peer_close_reports_loss_once() {
    let server = MockServer::start().await;
    let (reader, recorder, events) = connected_reader(&server).await;

    let (socket, _) = events.accept().await.unwrap();
    drop(socket);

    wait_until("connection loss", || recorder.lost.load(Ordering::SeqCst) > 0).await;
    wait_until("worker exit", || !reader.is_connected()).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.lost.load(Ordering::SeqCst), 1);
}
