//! End-to-end tests: a full daemon on an ephemeral port, driven through
//! the blocking client.

use acs_proto::client::AcsClient;
use acs_proto::{AcsReply, AcsRequest, DismountParams, MountParams};
use acsd::config::DaemonConfig;
use acsd::daemon::{Daemon, LibraryFactory};
use acsd::library::sim::SimulatedLibrary;
use acsd::library::LibraryApi;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> DaemonConfig {
    DaemonConfig::new()
        .port(0)
        .query_interval(Duration::from_millis(20))
        .command_timeout(Duration::from_secs(5))
        .tick_interval(Duration::from_millis(10))
        .probe_interval(Duration::ZERO)
        .probe_timeout(Duration::ZERO)
        .mount_workers(2)
}

async fn start_daemon(latency: Duration) -> SocketAddr {
    let factory: Arc<LibraryFactory> =
        Arc::new(move || Box::new(SimulatedLibrary::new(latency)) as Box<dyn LibraryApi>);
    let daemon = Daemon::bind(fast_config(), factory).await.unwrap();
    let port = daemon.local_addr().unwrap().port();
    tokio::spawn(daemon.run());
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn connect(addr: SocketAddr) -> AcsClient {
    let mut client = AcsClient::connect(addr).expect("connect to daemon");
    client
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    client
}

fn mount_read_only(vid: &str, drive: &str) -> AcsRequest {
    AcsRequest::MountReadOnly(MountParams {
        vid: vid.to_string(),
        drive: drive.parse().unwrap(),
    })
}

fn dismount(vid: &str, drive: &str) -> AcsRequest {
    AcsRequest::Dismount(DismountParams {
        vid: vid.to_string(),
        drive: drive.parse().unwrap(),
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mount_read_only_returns_zero() {
    let addr = start_daemon(Duration::ZERO).await;

    let reply = tokio::task::spawn_blocking(move || {
        connect(addr).call(&mount_read_only("VOL001", "1:2:3:4"))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(reply, AcsReply::ReturnValue(0));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dismount_round_trip() {
    let addr = start_daemon(Duration::ZERO).await;

    let reply = tokio::task::spawn_blocking(move || {
        connect(addr).call(&dismount("VOL001", "1:2:3:4"))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(reply, AcsReply::ReturnValue(0));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_dismount_for_same_drive_is_rejected() {
    // Enough robot latency that the first dismount is still in flight
    // when the second one arrives.
    let addr = start_daemon(Duration::from_millis(400)).await;

    let first = tokio::task::spawn_blocking(move || {
        connect(addr).call(&dismount("AAA111", "1:2:3:4"))
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = tokio::task::spawn_blocking(move || {
        connect(addr).call(&dismount("BBB222", "1:2:3:4"))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(second.code(), Some(libc::EBUSY));

    // The in-flight dismount still concludes normally.
    let first = first.await.unwrap().unwrap();
    assert_eq!(first, AcsReply::ReturnValue(0));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_corrupted_frame_gets_exception_and_connection_survives() {
    let addr = start_daemon(Duration::ZERO).await;

    let (first, second) = tokio::task::spawn_blocking(move || {
        use std::io::Write;
        use std::net::TcpStream;

        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();

        // Flip one payload byte after encoding; framing stays intact, the
        // digest no longer matches.
        let mut bytes = mount_read_only("VOL001", "1:2:3:4")
            .to_frame()
            .unwrap()
            .encode()
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        stream.write_all(&bytes).unwrap();

        let reply_frame = acs_proto::read_frame(&mut stream).unwrap();
        let first = AcsReply::from_frame(&reply_frame).unwrap();

        // Same connection, valid request.
        let frame = mount_read_only("VOL001", "1:2:3:4").to_frame().unwrap();
        acs_proto::write_frame(&mut stream, &frame).unwrap();
        let reply_frame = acs_proto::read_frame(&mut stream).unwrap();
        let second = AcsReply::from_frame(&reply_frame).unwrap();

        (first, second)
    })
    .await
    .unwrap();

    assert_eq!(first.code(), Some(libc::EINVAL));
    assert_eq!(second, AcsReply::ReturnValue(0));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_mount_reports_exception_with_cause() {
    use acsd::library::LibStatus;

    let factory: Arc<LibraryFactory> = Arc::new(|| {
        Box::new(SimulatedLibrary::instant().with_mount_status(LibStatus::DriveInUse))
            as Box<dyn LibraryApi>
    });
    let daemon = Daemon::bind(fast_config(), factory).await.unwrap();
    let addr = SocketAddr::from(([127, 0, 0, 1], daemon.local_addr().unwrap().port()));
    tokio::spawn(daemon.run());

    let reply = tokio::task::spawn_blocking(move || {
        connect(addr).call(&mount_read_only("VOL001", "1:2:3:4"))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(reply.code(), Some(libc::EIO));
    match reply {
        AcsReply::Exception { message, .. } => {
            assert!(message.contains("drive in use"), "message: {message}");
        }
        other => panic!("unexpected reply {other:?}"),
    }
}
