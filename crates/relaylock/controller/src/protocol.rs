//! Record operations on the four application sectors
//!
//! The free functions work inside an open [`SectorSession`] and can be
//! composed into larger sessions. The [`CardController`] methods open a card
//! session around them.

use relaylock_mifare_core::{CardTransport, CardUid, Result, SectorKey};
use tracing::{debug, info, instrument};

use crate::record::{
    AccessFlags, ApplicationRecord, Credentials, RECORD_SECTORS, SECTOR_IDENTIFIER, SECTOR_META,
    SECTOR_PASSWORD, SECTOR_USERNAME, format_metadata, parse_metadata,
};
use crate::sector::{SectorSession, encode_payload};
use crate::session::CardController;

/// Write metadata, username, identifier and password, in that order
///
/// A failing sector aborts the remaining writes; earlier sectors stay written.
pub fn write_record(
    session: &mut SectorSession<'_>,
    meta_prefix: &str,
    credentials: &Credentials,
    flags: AccessFlags,
) -> Result<()> {
    let sectors = [
        (SECTOR_META, format_metadata(meta_prefix, flags)),
        (SECTOR_USERNAME, credentials.username.clone()),
        (SECTOR_IDENTIFIER, credentials.identifier.clone()),
        (SECTOR_PASSWORD, credentials.password.clone()),
    ];
    for (sector, text) in &sectors {
        session.write_sector(*sector, text)?;
    }
    Ok(())
}

/// Read and validate a record
pub fn read_record(session: &mut SectorSession<'_>, meta_prefix: &str) -> Result<ApplicationRecord> {
    let metadata = session.read_sector(SECTOR_META)?;
    let flags = parse_metadata(&metadata, meta_prefix)?;

    let credentials = Credentials {
        username: session.read_sector(SECTOR_USERNAME)?,
        identifier: session.read_sector(SECTOR_IDENTIFIER)?,
        password: session.read_sector(SECTOR_PASSWORD)?,
    };
    Ok(ApplicationRecord {
        uid: session.uid().clone(),
        meta_prefix: meta_prefix.to_owned(),
        flags,
        credentials,
    })
}

/// Replace the key of every record sector, authenticating with the session key
pub fn rekey_all_sectors(session: &mut SectorSession<'_>, new_key: &SectorKey) -> Result<()> {
    for sector in RECORD_SECTORS {
        session.set_sector_trailer(sector, new_key)?;
    }
    Ok(())
}

/// Whether the session key opens every record sector
pub fn test_authentication(session: &mut SectorSession<'_>) -> bool {
    RECORD_SECTORS
        .into_iter()
        .all(|sector| session.authenticate_sector(sector, false).is_ok())
}

/// Write empty text to every record sector, metadata included
pub fn erase_record(session: &mut SectorSession<'_>) -> Result<()> {
    for sector in RECORD_SECTORS {
        session.write_sector(sector, "")?;
    }
    Ok(())
}

impl<T: CardTransport> CardController<T> {
    /// UID of the tag in the field
    pub fn read_uid(&self) -> Result<CardUid> {
        self.with_card(None, None, |session| Ok(session.uid().clone()))
    }

    /// Write a full record
    ///
    /// `flags` defaults to the provisioning flags of the configured layout.
    /// Oversized fields are rejected before the reader is touched.
    #[instrument(level = "debug", skip(self, credentials), fields(username = %credentials.username))]
    pub fn write_record(
        &self,
        credentials: &Credentials,
        uid: Option<&CardUid>,
        key: Option<SectorKey>,
        flags: Option<AccessFlags>,
    ) -> Result<()> {
        let flags = flags.unwrap_or_else(|| AccessFlags::provisioning_default(self.flag_layout()));
        let metadata = format_metadata(self.meta_prefix(), flags);
        for text in [
            metadata.as_str(),
            credentials.username.as_str(),
            credentials.identifier.as_str(),
            credentials.password.as_str(),
        ] {
            encode_payload(text)?;
        }

        self.with_card(uid, key, |session| {
            write_record(session, self.meta_prefix(), credentials, flags)?;
            info!(uid = %session.uid(), %flags, "Record written");
            Ok(())
        })
    }

    /// Read the record of the tag in the field
    #[instrument(level = "debug", skip(self))]
    pub fn read_record(&self, uid: Option<&CardUid>, key: Option<SectorKey>) -> Result<ApplicationRecord> {
        self.with_card(uid, key, |session| read_record(session, self.meta_prefix()))
    }

    /// Replace the key of every record sector
    #[instrument(level = "debug", skip(self, new_key))]
    pub fn rekey_all_sectors(
        &self,
        new_key: &SectorKey,
        uid: Option<&CardUid>,
        key: Option<SectorKey>,
    ) -> Result<()> {
        self.with_card(uid, key, |session| {
            rekey_all_sectors(session, new_key)?;
            info!(uid = %session.uid(), default = new_key.is_default(), "Sector keys replaced");
            Ok(())
        })
    }

    /// Whether `key` opens every record sector
    pub fn test_authentication(&self, uid: Option<&CardUid>, key: SectorKey) -> Result<bool> {
        self.with_card(uid, Some(key), |session| {
            let accepted = test_authentication(session);
            debug!(uid = %session.uid(), ?key, accepted, "Key probed");
            Ok(accepted)
        })
    }

    /// Clear the record of the tag in the field
    #[instrument(level = "debug", skip(self))]
    pub fn erase_record(&self, uid: Option<&CardUid>, key: Option<SectorKey>) -> Result<()> {
        self.with_card(uid, key, |session| {
            erase_record(session)?;
            info!(uid = %session.uid(), "Record erased");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use relaylock_mifare_core::Error;
    use relaylock_mifare_core::transport::{MockTransport, TransportCall};

    use super::*;
    use crate::record::FlagLayout;

    const CUSTOM: SectorKey = SectorKey::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);

    fn controller(transport: &MockTransport) -> CardController<MockTransport> {
        CardController::new(transport.clone(), CUSTOM, "prefix")
    }

    #[test]
    fn test_provision_and_read_back() {
        let transport = MockTransport::new();
        let ctl = controller(&transport);

        ctl.rekey_all_sectors(&CUSTOM, None, Some(SectorKey::DEFAULT))
            .unwrap();
        let credentials = Credentials::new("alice", "C123", "secret");
        ctl.write_record(&credentials, None, Some(CUSTOM), Some(AccessFlags::new(1)))
            .unwrap();

        let record = ctl.read_record(None, None).unwrap();
        assert_eq!(record.credentials, credentials);
        assert_eq!(record.flags, AccessFlags::new(1));
        assert_eq!(record.meta_prefix, "prefix");
        assert_eq!(record.uid.to_string(), "0x04A1B2C3");
    }

    #[test]
    fn test_metadata_validation() {
        for (metadata, ok) in [
            ("wrongprefix_1", false),
            ("prefix_abc", false),
            ("prefix1", false),
            ("prefix_1", true),
        ] {
            let transport = MockTransport::new();
            transport.store(1, metadata.as_bytes());
            let result = controller(&transport).read_record(None, None);
            if ok {
                assert_eq!(result.unwrap().flags, AccessFlags::new(1));
            } else {
                assert!(
                    matches!(result, Err(Error::UnexpectedMetaData(_))),
                    "{metadata:?} should be rejected"
                );
                // Foreign metadata does not depend on the key
                assert_eq!(transport.count(|c| *c == TransportCall::Select), 1);
            }
        }
    }

    #[test]
    fn test_write_order_and_default_flags() {
        let transport = MockTransport::new();
        let ctl = controller(&transport);
        ctl.write_record(&Credentials::new("bob", "C7", "pw"), None, None, None)
            .unwrap();

        let auth_blocks: Vec<_> = transport
            .calls()
            .into_iter()
            .filter_map(|c| match c.call {
                TransportCall::Authenticate { block } => Some(block),
                _ => None,
            })
            .collect();
        assert_eq!(auth_blocks, vec![4, 8, 12, 16]);
        assert_eq!(&transport.block(4)[..8], b"prefix_1");

        let legacy = controller(&transport).with_flag_layout(FlagLayout::Legacy);
        legacy
            .write_record(&Credentials::new("bob", "C7", "pw"), None, None, None)
            .unwrap();
        assert_eq!(&transport.block(4)[..8], b"prefix_3");
    }

    #[test]
    fn test_oversized_field_touches_no_hardware() {
        let transport = MockTransport::new();
        let ctl = controller(&transport);
        let credentials = Credentials::new("alice", "C123", "p".repeat(49));

        let err = ctl.write_record(&credentials, None, None, None).unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { len: 49, .. }));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_failed_write_leaves_earlier_sectors() {
        let transport = MockTransport::new().with_failing_write(12);
        let ctl = controller(&transport);
        let credentials = Credentials::new("alice", "C123", "secret");

        let err = ctl
            .write_record(&credentials, None, Some(SectorKey::DEFAULT), None)
            .unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailure(_)));
        assert_eq!(&transport.block(8)[..5], b"alice");
        assert_eq!(transport.block(16), [0u8; 16]);
    }

    #[test]
    fn test_authentication_probe() {
        let transport = MockTransport::new().with_key([1, 2], CUSTOM);
        let ctl = controller(&transport);

        assert!(!ctl.test_authentication(None, SectorKey::DEFAULT).unwrap());
        assert!(!ctl.test_authentication(None, CUSTOM).unwrap());

        let transport = MockTransport::new().with_key(1..=4, CUSTOM);
        let ctl = controller(&transport);
        assert!(ctl.test_authentication(None, CUSTOM).unwrap());
        assert!(!ctl.test_authentication(None, SectorKey::DEFAULT).unwrap());
    }

    #[test]
    fn test_erase_and_reset() {
        let transport = MockTransport::new();
        let ctl = controller(&transport);
        ctl.rekey_all_sectors(&CUSTOM, None, Some(SectorKey::DEFAULT))
            .unwrap();
        ctl.write_record(&Credentials::new("alice", "C123", "secret"), None, None, None)
            .unwrap();

        ctl.erase_record(None, None).unwrap();
        ctl.rekey_all_sectors(&SectorKey::DEFAULT, None, None).unwrap();

        for sector in 1..=4 {
            assert_eq!(transport.sector_key(sector), Some(SectorKey::DEFAULT));
        }
        for block in [4, 8, 12, 16] {
            assert_eq!(transport.block(block), [0u8; 16]);
        }
        // The erased metadata no longer parses as a record
        assert!(matches!(
            ctl.read_record(None, None),
            Err(Error::UnexpectedMetaData(_))
        ));
    }
}
