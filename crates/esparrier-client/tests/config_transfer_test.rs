//! Multi-block config reads and writes against an emulated device.

mod common;

use std::time::Duration;

use common::MockDevice;
use esparrier_client::{
    AppConfig, ClientError, ConfigDocument, ErrorKind, Session, TransportError, ValidationError,
};
use esparrier_protocol::DeviceErrorCode;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;

// ============================================================================
// Read
// ============================================================================

#[tokio::test]
async fn test_read_config() {
    let device = MockDevice::new();
    let session = Session::new(device.clone());

    let document = session.read_config().await.expect("read");
    let config = AppConfig::from_document(&document).expect("typed config");
    assert_eq!(config.ssid, "home");
    assert_eq!(config.password.expose(), "hunter22");
    assert_eq!(config.server, "10.0.0.2:24800");
    assert_eq!(config.screen_name, "desk");
    config.validate().expect("valid");

    let raw = session.read_config_raw().await.expect("raw read");
    assert_eq!(raw, device.state().config);
}

#[tokio::test]
async fn test_read_truncated_transfer_is_connectivity_error() {
    let config = format!(r#"{{"note":"{}"}}"#, "y".repeat(160));
    let device = MockDevice::with_config(config.as_bytes());
    // Header plus two of the three blocks.
    device.state().close_after = Some(3);
    let session = Session::new(device);

    let err = session.read_config().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Connectivity(TransportError::Closed)
    ));
}

#[tokio::test]
async fn test_read_error_header() {
    let device = MockDevice::new();
    device.script(&[b'e', b'e']);
    let session = Session::new(device);

    let err = session.read_config().await.unwrap_err();
    assert_eq!(err.device_code(), Some(DeviceErrorCode::EndpointError));
}

#[tokio::test]
async fn test_read_wrong_header() {
    let device = MockDevice::new();
    device.script(b"o");
    let session = Session::new(device);

    let err = session.read_config().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[tokio::test]
async fn test_read_undecodable_document() {
    let device = MockDevice::with_config(b"{\"ssid\": tru");
    let session = Session::new(device);

    let err = session.read_config().await.unwrap_err();
    assert!(matches!(err, ClientError::Document(_)));
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[tokio::test]
async fn test_read_empty_config() {
    let device = MockDevice::with_config(b"");
    let session = Session::new(device);

    let raw = session.read_config_raw().await.expect("raw read");
    assert!(raw.is_empty());
}

// ============================================================================
// Write
// ============================================================================

#[tokio::test]
async fn test_write_100_byte_document() {
    let device = MockDevice::new();
    let session = Session::new(device.clone());

    let document = ConfigDocument::new(json!({ "k": "a".repeat(92) }));
    let payload = document.to_payload().expect("payload");
    assert_eq!(payload.len(), 100);

    session.write_config(&document).await.expect("write");

    let frames = device.state().host_frames();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], vec![b'w', 2]);
    assert_eq!(frames[1], payload[..64].to_vec());
    assert_eq!(frames[2].len(), 64);
    assert_eq!(&frames[2][..36], &payload[64..]);
    assert!(frames[2][36..].iter().all(|&b| b == 0));

    assert_eq!(device.state().staged.as_deref(), Some(payload.as_slice()));
}

#[tokio::test]
async fn test_write_maximum_size() {
    let device = MockDevice::new();
    let session = Session::new(device.clone());

    let document = ConfigDocument::new(json!({ "k": "a".repeat(4088) }));
    assert_eq!(document.to_payload().expect("payload").len(), 4096);

    session.write_config(&document).await.expect("write");
    let frames = device.state().host_frames();
    assert_eq!(frames[0], vec![b'w', 64]);
    assert_eq!(frames.len(), 65);
}

#[tokio::test]
async fn test_write_oversized_document_sends_nothing() {
    let device = MockDevice::new();
    let session = Session::new(device.clone());

    let document = ConfigDocument::new(json!({ "k": "a".repeat(4089) }));
    let err = session.write_config(&document).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Validation(ValidationError::ConfigTooLarge {
            size: 4097,
            max: 4096
        })
    ));
    assert!(device.state().host_frames().is_empty());

    let err = session.write_config_raw(&[b'x'; 5000]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(device.state().host_frames().is_empty());
}

#[tokio::test]
async fn test_write_unrepresentable_payload_sends_nothing() {
    let device = MockDevice::new();
    let session = Session::new(device.clone());

    let err = session
        .write_config_raw(&[b'{', b'"', 0xF5, b'"', b'}'])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Validation(ValidationError::UnrepresentableByte {
            byte: 0xF5,
            offset: 2
        })
    ));
    assert!(device.state().host_frames().is_empty());
}

fn three_block_payload() -> Vec<u8> {
    let payload = format!(r#"{{"note":"{}"}}"#, "z".repeat(140)).into_bytes();
    assert_eq!(payload.len(), 151);
    payload
}

#[tokio::test]
async fn test_write_connection_lost_mid_blocks() {
    let device = MockDevice::new();
    // The command and the first block get through.
    device.state().fail_send_after = Some(2);
    let session = Session::new(device.clone());

    let err = session
        .write_config_raw(&three_block_payload())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Connectivity(TransportError::Closed)
    ));

    let frames = device.state().host_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], vec![b'w', 3]);
    assert!(device.state().staged.is_none());
}

#[tokio::test]
async fn test_close_during_write_awaiting_ack() {
    let device = MockDevice::new();
    device.state().silent = true;
    let session = Session::new(device.clone());
    let handle = session.close_handle();
    let payload = three_block_payload();

    let (result, ()) = tokio::join!(session.write_config_raw(&payload), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.close();
    });
    assert!(matches!(
        result.unwrap_err(),
        ClientError::Connectivity(TransportError::Closed)
    ));
    assert_eq!(device.state().host_frames().len(), 4);

    let err = session.commit_config().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);
    assert_eq!(device.state().host_frames().len(), 4);
}

#[tokio::test]
async fn test_write_rejected_by_device() {
    let device = MockDevice::new();
    let session = Session::new(device.clone());

    let err = session.write_config_raw(b"not json").await.unwrap_err();
    assert_eq!(err.device_code(), Some(DeviceErrorCode::InvalidConfig));
    assert!(device.state().staged.is_none());

    // The device is back to accepting commands.
    session.get_status().await.expect("status after rejected write");
}

#[tokio::test]
async fn test_write_commit_read_back() {
    let device = MockDevice::new();
    let session = Session::new(device.clone());

    let mut config = AppConfig::from_document(&session.read_config().await.expect("read"))
        .expect("typed config");
    config.screen_name = "laptop".to_string();
    config.brightness = Some(25);
    config.dns_server = vec!["1.1.1.1".to_string()];
    config.validate().expect("valid");

    let document = config.to_document().expect("document");
    session.write_config(&document).await.expect("write");
    session.commit_config().await.expect("commit");
    assert_eq!(device.state().commits, 1);

    let read_back = session.read_config().await.expect("read back");
    assert_eq!(read_back, document);
    assert_eq!(AppConfig::from_document(&read_back).expect("typed"), config);
}

#[tokio::test]
async fn test_seeded_random_round_trips() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
    let device = MockDevice::new();
    let session = Session::new(device.clone());

    for _ in 0..16 {
        let mut object = serde_json::Map::new();
        for index in 0..rng.gen_range(1..8) {
            let len = rng.gen_range(0..200);
            let text: String = (0..len)
                .map(|_| rng.gen_range(b' '..=b'~') as char)
                .collect();
            object.insert(format!("field{}", index), json!(text));
        }
        object.insert("flag".to_string(), json!(rng.gen_bool(0.5)));
        object.insert("level".to_string(), json!(rng.gen_range(0..=255u8)));
        let document = ConfigDocument::new(serde_json::Value::Object(object));

        session.write_config(&document).await.expect("write");
        session.commit_config().await.expect("commit");
        let read_back = session.read_config().await.expect("read");
        assert_eq!(read_back, document);
    }
}
