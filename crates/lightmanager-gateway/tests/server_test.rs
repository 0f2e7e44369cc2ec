//! End-to-end tests over real TCP connections.
//!
//! Several tests assert on timing, so they run one at a time.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{engine_with, Recorder, RecordingDevice};
use lightmanager_gateway::{CommandEngine, GatewayServer, ShutdownHandle};
use serial_test::serial;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

const TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start(engine: Arc<CommandEngine>) -> Self {
        let shutdown = ShutdownHandle::new();
        let server = GatewayServer::bind("127.0.0.1:0".parse().unwrap(), engine, shutdown.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn(server.run());
        TestServer {
            addr,
            shutdown,
            handle,
        }
    }

    async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(TIMEOUT, self.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

fn recording_server_engine() -> (Arc<CommandEngine>, Arc<Recorder>) {
    let (device, recorder) = RecordingDevice::new();
    let device = device.with_latency(Duration::from_millis(2));
    (engine_with(Box::new(device)), recorder)
}

/// Read until the received text ends with `terminator`.
async fn read_until(stream: &mut TcpStream, terminator: &str) -> String {
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    tokio::time::timeout(TIMEOUT, async {
        while !received.ends_with(terminator.as_bytes()) {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed early: {:?}", String::from_utf8_lossy(&received));
            received.extend_from_slice(&buf[..n]);
        }
    })
    .await
    .unwrap();
    String::from_utf8(received).unwrap()
}

async fn command(stream: &mut TcpStream, line: &str) -> String {
    stream.write_all(format!("{}\r\n", line).as_bytes()).await.unwrap();
    read_until(stream, ">").await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_command_round_trip() {
    let (engine, recorder) = recording_server_engine();
    let server = TestServer::start(engine).await;
    let mut client = server.connect().await;

    let out = command(&mut client, "FS20 1111 ON").await;
    assert_eq!(out, "FS20 1111 ON: OK\r\n>");
    assert_eq!(recorder.frames().len(), 1);

    let out = command(&mut client, "QUIET;GET TEMP").await;
    assert_eq!(out, "22.5\r\n>");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_quit_closes_only_this_connection() {
    let (engine, _recorder) = recording_server_engine();
    let server = TestServer::start(engine).await;
    let mut first = server.connect().await;
    let mut second = server.connect().await;

    first.write_all(b"QUIT\r\n").await.unwrap();
    assert_eq!(read_until(&mut first, "bye\r\n").await, "bye\r\n");
    let mut rest = Vec::new();
    tokio::time::timeout(TIMEOUT, first.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());

    let out = command(&mut second, "VERSION").await;
    assert!(out.starts_with("Lightmanager v"), "{out}");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_exit_stops_server() {
    let (engine, _recorder) = recording_server_engine();
    let server = TestServer::start(engine).await;
    let mut client = server.connect().await;
    let mut bystander = server.connect().await;

    client.write_all(b"EXIT\r\n").await.unwrap();
    assert_eq!(read_until(&mut client, "bye\r\n").await, "bye\r\n");

    tokio::time::timeout(TIMEOUT, server.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(server.shutdown.is_triggered());

    let mut rest = Vec::new();
    tokio::time::timeout(TIMEOUT, bystander.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(TcpStream::connect(server.addr).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_housecode_visible_to_other_connections() {
    let (engine, recorder) = recording_server_engine();
    let server = TestServer::start(engine).await;
    let mut first = server.connect().await;
    let mut second = server.connect().await;

    let out = command(&mut first, "SET HOUSECODE 44444444").await;
    assert_eq!(out, "SET HOUSECODE 44444444: OK\r\n>");

    let out = command(&mut second, "GET HOUSECODE;FS20 1111 OFF").await;
    assert!(out.starts_with("44444444\r\n"), "{out}");
    assert_eq!(recorder.frames()[0][1..3], [0xff, 0xff]);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_wait_blocks_only_its_client() {
    let (engine, _recorder) = recording_server_engine();
    let server = TestServer::start(engine).await;
    let mut waiting = server.connect().await;
    let mut other = server.connect().await;

    waiting.write_all(b"WAIT 1500\r\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    let out = command(&mut other, "VERSION").await;
    assert!(out.contains("VERSION: OK"));
    assert!(started.elapsed() < Duration::from_millis(1000));

    assert_eq!(read_until(&mut waiting, ">").await, "WAIT 1500: OK\r\n>");
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_device_access_never_overlaps() {
    let (engine, recorder) = recording_server_engine();
    let server = TestServer::start(engine).await;

    let clients: Vec<_> = (1..=4)
        .map(|n| {
            let addr = server.addr;
            tokio::spawn(async move {
                let mut client = TcpStream::connect(addr).await.unwrap();
                for _ in 0..5 {
                    let out = command(&mut client, &format!("SCENE {}", n)).await;
                    assert_eq!(out, format!("SCENE {}: OK\r\n>", n));
                }
            })
        })
        .collect();
    for client in clients {
        client.await.unwrap();
    }

    assert_eq!(recorder.frames().len(), 20);
    assert_eq!(recorder.overlaps(), 0);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_lines_split_across_reads() {
    let (engine, _recorder) = recording_server_engine();
    let server = TestServer::start(engine).await;
    let mut client = server.connect().await;

    client.write_all(b"GET HOUSE").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.write_all(b"CODE\nVERSION\r\n").await.unwrap();
    let out = read_until(&mut client, "VERSION: OK\r\n>").await;
    assert!(out.starts_with("11111111\r\nGET HOUSECODE: OK\r\n>"), "{out}");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_overlong_line_is_rejected() {
    let (engine, recorder) = recording_server_engine();
    let server = TestServer::start(engine).await;
    let mut client = server.connect().await;

    let mut line = "SCENE 1 ".repeat(300);
    line.push_str("\r\n");
    client.write_all(line.as_bytes()).await.unwrap();
    let out = read_until(&mut client, ">").await;
    assert!(out.starts_with("ERROR - input line too long"), "{out}");
    assert!(recorder.frames().is_empty());

    let out = command(&mut client, "SCENE 1").await;
    assert_eq!(out, "SCENE 1: OK\r\n>");
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_overlong_http_request_is_rejected() {
    let (engine, recorder) = recording_server_engine();
    let server = TestServer::start(engine).await;
    let mut client = server.connect().await;

    let request = format!(
        "GET /cmd={} HTTP/1.1\r\nHost: localhost\r\nCookie: a=1; scene 7\r\n\r\n",
        "scene%201%3B".repeat(120)
    );
    client.write_all(request.as_bytes()).await.unwrap();
    let mut page = Vec::new();
    tokio::time::timeout(TIMEOUT, client.read_to_end(&mut page))
        .await
        .unwrap()
        .unwrap();
    let page = String::from_utf8(page).unwrap();
    assert!(page.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{page}");
    assert!(page.ends_with("</html>\r\n"));
    assert!(!page.contains("ERROR"));
    assert!(recorder.frames().is_empty());

    server.stop().await;
}

#[test]
#[serial]
fn test_idle_clients_do_not_block_new_ones() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .max_blocking_threads(2)
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let (engine, _recorder) = recording_server_engine();
        let server = TestServer::start(engine).await;

        let mut idle = Vec::new();
        for _ in 0..3 {
            let mut client = server.connect().await;
            assert!(command(&mut client, "VERSION").await.contains("VERSION: OK"));
            idle.push(client);
        }

        let mut client = server.connect().await;
        let out = command(&mut client, "VERSION").await;
        assert!(out.contains("VERSION: OK"), "{out}");

        drop(idle);
        server.stop().await;
    });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_http_request_closes_connection() {
    let (engine, _recorder) = recording_server_engine();
    let server = TestServer::start(engine).await;
    let mut client = server.connect().await;

    client
        .write_all(b"GET /cmd=get%20housecode HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\n\r\n")
        .await
        .unwrap();
    let mut page = Vec::new();
    tokio::time::timeout(TIMEOUT, client.read_to_end(&mut page))
        .await
        .unwrap()
        .unwrap();
    let page = String::from_utf8(page).unwrap();
    assert!(page.starts_with("HTTP/1.1 200 OK\r\n"), "{page}");
    assert!(page.contains("11111111<br />"));
    assert!(!page.contains("Host"));
    assert!(page.ends_with("</html>\r\n"));

    server.stop().await;
}
