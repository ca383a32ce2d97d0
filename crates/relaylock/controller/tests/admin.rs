//! Provisioning and retirement flows against a simulated tag

use std::sync::Arc;
use std::time::Duration;

use relaylock_controller::mifare::transport::{MockTransport, TransportCall};
use relaylock_controller::mifare::{CardUid, SectorKey};
use relaylock_controller::{
    AccessFlags, Admin, AdminOutcome, CardController, Credentials, JsonRegistry, KeyProbe,
    ProvisionRequest, TagRegistry,
};

const CUSTOM: SectorKey = SectorKey::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);

struct Fixture {
    transport: MockTransport,
    registry: Arc<JsonRegistry>,
    admin: Admin<MockTransport>,
    _dir: tempfile::TempDir,
}

fn fixture(transport: MockTransport) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(JsonRegistry::new(dir.path().join("tags.json")));
    let controller = Arc::new(CardController::new(transport.clone(), CUSTOM, "prefix"));
    let admin = Admin::new(controller, registry.clone())
        .with_read_uid_timeout(Duration::from_millis(50), Duration::from_millis(10));
    Fixture {
        transport,
        registry,
        admin,
        _dir: dir,
    }
}

fn request() -> ProvisionRequest {
    serde_json::from_str(
        r#"{"username": "alice", "collmex_id": "C123", "password": "secret", "timestamp": "2024-05-01 10:00"}"#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_provision_blank_card() {
    let f = fixture(MockTransport::new());

    assert_eq!(f.admin.provision(request()).await, AdminOutcome::ok());

    for sector in 1..=4 {
        assert_eq!(f.transport.sector_key(sector), Some(CUSTOM));
    }
    let record = f.admin.controller().read_record(None, None).unwrap();
    assert_eq!(record.credentials.username, "alice");
    assert_eq!(record.credentials.identifier, "C123");
    assert_eq!(record.flags, AccessFlags::new(1));

    let entries = f.registry.get_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].uid.to_string(), "0x04A1B2C3");
    assert_eq!(entries[0].timestamp, "2024-05-01 10:00");

    assert_eq!(
        f.admin.probe(None).await.unwrap(),
        KeyProbe {
            default: false,
            custom: true
        }
    );
}

#[tokio::test]
async fn test_provision_without_card_times_out() {
    let f = fixture(MockTransport::new().absent());

    let outcome = f.admin.provision(request()).await;
    assert!(!outcome.success);
    assert_eq!(outcome.msg.as_deref(), Some("No RFID card detected: no tag in range"));
    assert!(f.registry.get_all().unwrap().is_empty());
    assert!(f.transport.count(|c| *c == TransportCall::Request) > 3);
}

#[tokio::test]
async fn test_read_uid_waits_for_card() {
    let f = fixture(MockTransport::new().absent());
    let transport = f.transport.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(15)).await;
        transport.insert();
    });

    let admin = f.admin.with_read_uid_timeout(Duration::from_secs(5), Duration::from_millis(5));
    let uid = admin.read_uid().await.unwrap();
    assert_eq!(uid, "0x04A1B2C3".parse::<CardUid>().unwrap());
}

#[tokio::test]
async fn test_provision_already_keyed_card_fails() {
    let f = fixture(MockTransport::new().with_key(1..=4, CUSTOM));

    let outcome = f.admin.provision(request()).await;
    assert!(!outcome.success);
    assert!(outcome.msg.unwrap().contains("0x04A1B2C3"));
    assert!(f.registry.get_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_deregister_with_reset() {
    let f = fixture(MockTransport::new());
    assert!(f.admin.provision(request()).await.success);

    let uid: CardUid = "0x04A1B2C3".parse().unwrap();
    assert_eq!(f.admin.deregister(Some(uid), true).await, AdminOutcome::ok());

    for sector in 1..=4 {
        assert_eq!(f.transport.sector_key(sector), Some(SectorKey::DEFAULT));
    }
    for block in [4, 8, 12, 16] {
        assert_eq!(f.transport.block(block), [0u8; 16]);
    }
    assert!(f.registry.get_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_deregister_absent_uid_without_reset() {
    let f = fixture(MockTransport::new().absent());

    // The card itself is not needed when the UID is given and nothing is reset
    let uid: CardUid = "0x01020304".parse().unwrap();
    assert_eq!(f.admin.deregister(Some(uid), false).await, AdminOutcome::ok());
    assert!(f.transport.calls().is_empty());
}

#[tokio::test]
async fn test_deregister_wrong_card_keeps_entry() {
    let f = fixture(MockTransport::new());
    assert!(f.admin.provision(request()).await.success);

    let other: CardUid = "0x01020304".parse().unwrap();
    let outcome = f.admin.deregister(Some(other), true).await;
    assert!(!outcome.success);
    assert_eq!(f.registry.get_all().unwrap().len(), 1);
}

#[tokio::test]
async fn test_migrate_legacy_flags() {
    for (legacy, current) in [(3, 1), (2, 1), (1, 0)] {
        let f = fixture(MockTransport::new().with_key(1..=4, CUSTOM));
        let credentials = Credentials::new("alice", "C123", "secret");
        f.admin
            .controller()
            .write_record(&credentials, None, None, Some(AccessFlags::new(legacy)))
            .unwrap();

        assert_eq!(f.admin.migrate(None).await, AdminOutcome::ok());

        let record = f.admin.controller().read_record(None, None).unwrap();
        assert_eq!(record.flags, AccessFlags::new(current), "legacy flags {legacy}");
        assert_eq!(record.credentials, credentials);
        assert_eq!(f.transport.sector_key(1), Some(CUSTOM));
    }
}

#[tokio::test]
async fn test_migrate_foreign_card_fails() {
    let f = fixture(MockTransport::new());
    f.transport.store(1, b"othershop_3");

    let outcome = f.admin.migrate(None).await;
    assert!(!outcome.success);
    assert_eq!(&f.transport.block(4)[..11], b"othershop_3");
}

#[tokio::test]
async fn test_outcome_serialization() {
    assert_eq!(
        serde_json::to_string(&AdminOutcome::ok()).unwrap(),
        r#"{"success":true}"#
    );
    assert_eq!(
        serde_json::to_string(&AdminOutcome::failure("boom")).unwrap(),
        r#"{"success":false,"msg":"boom"}"#
    );
}
