//! Command handlers

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use relaylock_controller::mifare::{CardUid, SectorKey};
use relaylock_controller::{
    Admin, AdminOutcome, ApplicationRecord, CardController, ProvisionRequest, TagRegistry,
};
use relaylock_mifare_pcsc::{PcscDeviceManager, PcscError, PcscTransport};

use crate::display;

/// List all available readers
pub(crate) fn list_readers(manager: &PcscDeviceManager) -> eyre::Result<()> {
    let readers = match manager.list_readers() {
        Ok(readers) => readers,
        Err(PcscError::NoReadersAvailable) => {
            println!("{}", display::warning("No readers found!"));
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = reader
            .tag_type()
            .map_or_else(|| "no card".to_string(), |tag| tag.to_string());
        println!("{}. {} ({})", i + 1, reader.name(), status);
    }
    Ok(())
}

/// List registered tags
pub(crate) fn list_tags(registry: &dyn TagRegistry, json: bool) -> eyre::Result<()> {
    let entries = registry.get_all()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No tags registered");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {} ({})  registered {}",
            entry.uid, entry.username, entry.identifier, entry.timestamp
        );
    }
    Ok(())
}

/// Print the UID of the next presented tag
pub(crate) async fn read_uid(admin: &Admin<PcscTransport>) -> eyre::Result<()> {
    println!("Present a tag to the reader...");
    let uid = admin.read_uid().await?;
    println!("{uid}");
    Ok(())
}

/// Print the record of the tag in the field
pub(crate) async fn read_record(
    controller: &Arc<CardController<PcscTransport>>,
    key: Option<SectorKey>,
    json: bool,
) -> eyre::Result<()> {
    let controller = Arc::clone(controller);
    let record = tokio::task::spawn_blocking(move || controller.read_record(None, key)).await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&record_json(&record))?);
    } else {
        println!(
            "{}",
            display::key_value_box(
                "Record",
                vec![
                    ("UID", record.uid.to_string()),
                    ("Prefix", record.meta_prefix.clone()),
                    ("Flags", record.flags.to_string()),
                    ("Username", record.credentials.username.clone()),
                    ("Identifier", record.credentials.identifier.clone()),
                ],
            )
        );
    }
    Ok(())
}

fn record_json(record: &ApplicationRecord) -> serde_json::Value {
    serde_json::json!({
        "uid": record.uid.to_string(),
        "meta_prefix": record.meta_prefix,
        "flags": record.flags,
        "credentials": record.credentials,
    })
}

/// Report which keys open the tag in the field
pub(crate) async fn probe(admin: &Admin<PcscTransport>) -> eyre::Result<()> {
    let probe = admin.probe(None).await?;
    let yes_no = |ok: bool| String::from(if ok { "yes" } else { "no" });
    println!(
        "{}",
        display::key_value_box(
            "Key probe",
            vec![
                ("Factory key", yes_no(probe.default)),
                ("Installation key", yes_no(probe.custom)),
            ],
        )
    );
    Ok(())
}

/// Provision the next presented tag
pub(crate) async fn provision(
    admin: &Admin<PcscTransport>,
    request: ProvisionRequest,
) -> eyre::Result<()> {
    println!("Present a blank tag to the reader...");
    report(admin.provision(request).await, "Tag provisioned")
}

/// Remove a tag from the registry
pub(crate) async fn deregister(
    admin: &Admin<PcscTransport>,
    uid: Option<CardUid>,
    reset: bool,
) -> eyre::Result<()> {
    if uid.is_none() {
        println!("Present the tag to the reader...");
    }
    report(admin.deregister(uid, reset).await, "Tag deregistered")
}

/// Convert the flags of a legacy-layout tag
pub(crate) async fn migrate(admin: &Admin<PcscTransport>, uid: Option<CardUid>) -> eyre::Result<()> {
    if uid.is_none() {
        println!("Present the tag to the reader...");
    }
    report(admin.migrate(uid).await, "Tag flags migrated")
}

fn report(outcome: AdminOutcome, message: &str) -> eyre::Result<()> {
    if outcome.success {
        println!("{}", display::success(message));
        Ok(())
    } else {
        let msg = outcome.msg.unwrap_or_else(|| "unknown error".into());
        println!("{}", display::failure(&msg));
        Err(eyre::eyre!(msg))
    }
}

/// The current time in Unix seconds
pub(crate) fn now() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}
