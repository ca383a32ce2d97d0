//! Card sessions over the shared reader
//!
//! [`CardController::with_card`] is the single entry point to the reader. It
//! holds the reader lock for the whole session, so two sessions never
//! interleave transport calls, and it tears down the crypto state after every
//! attempt, whatever the attempt's outcome.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;
use relaylock_mifare_core::{CardTransport, CardUid, Error, Result, SectorKey};
use tracing::{debug, instrument, trace, warn};

use crate::config::Config;
use crate::record::FlagLayout;
use crate::sector::SectorSession;

/// Presence requests per session before giving up
pub const PRESENCE_ATTEMPTS: usize = 3;

/// Owner of the card reader and the installation's card parameters
#[derive(Debug)]
pub struct CardController<T> {
    /// The reader; its lock is the session lock
    transport: Mutex<T>,
    /// Key of provisioned tags
    custom_key: SectorKey,
    /// Expected prefix of the metadata sector
    meta_prefix: String,
    /// Flag bit convention of the provisioned tags
    flag_layout: FlagLayout,
}

impl<T: CardTransport> CardController<T> {
    /// Create a controller for a reader
    pub fn new(transport: T, custom_key: SectorKey, meta_prefix: impl Into<String>) -> Self {
        Self {
            transport: Mutex::new(transport),
            custom_key,
            meta_prefix: meta_prefix.into(),
            flag_layout: FlagLayout::default(),
        }
    }

    /// Create a controller from the loaded configuration
    pub fn from_config(transport: T, config: &Config) -> Self {
        Self::new(transport, config.custom_key(), config.meta_prefix.clone())
            .with_flag_layout(config.flag_layout)
    }

    /// Use a different flag bit convention
    pub const fn with_flag_layout(mut self, layout: FlagLayout) -> Self {
        self.flag_layout = layout;
        self
    }

    /// Key of provisioned tags
    pub const fn custom_key(&self) -> &SectorKey {
        &self.custom_key
    }

    /// Expected prefix of the metadata sector
    pub fn meta_prefix(&self) -> &str {
        &self.meta_prefix
    }

    /// Flag bit convention of the provisioned tags
    pub const fn flag_layout(&self) -> FlagLayout {
        self.flag_layout
    }

    /// Keys tried by a session, in order
    ///
    /// The default key comes first so blank tags are found as well.
    pub fn key_candidates(&self, required_key: Option<SectorKey>) -> Vec<SectorKey> {
        match required_key {
            Some(key) => vec![key],
            None => vec![SectorKey::DEFAULT, self.custom_key],
        }
    }

    /// Run `operation` against the tag in the field
    ///
    /// The tag is detected, optionally checked against `required_uid`, and
    /// selected once per key candidate. Authentication and block I/O failures
    /// move on to the next candidate; every other failure ends the session.
    /// When all candidates fail the session fails with an authentication
    /// failure naming the tag.
    #[instrument(level = "debug", skip_all, fields(required_uid = ?required_uid))]
    pub fn with_card<R, F>(
        &self,
        required_uid: Option<&CardUid>,
        required_key: Option<SectorKey>,
        mut operation: F,
    ) -> Result<R>
    where
        F: FnMut(&mut SectorSession<'_>) -> Result<R>,
    {
        let mut transport = self.transport.lock();
        let candidates = self.key_candidates(required_key);
        let mut last_uid = None;

        for (attempt, key) in candidates.into_iter().enumerate() {
            let mut guard = CryptoGuard::new(&mut *transport);
            let uid = detect(&mut *guard, required_uid)?;
            last_uid = Some(uid.clone());

            debug!(%uid, attempt, ?key, "Running card operation");
            let mut session = SectorSession::new(&mut *guard, uid, key);
            match operation(&mut session) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!(attempt, ?key, error = %e, "Key candidate failed");
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::keys_exhausted(last_uid.as_ref()))
    }
}

/// Detect, identify and select the tag in the field
fn detect(transport: &mut dyn CardTransport, required_uid: Option<&CardUid>) -> Result<CardUid> {
    let tag_type = (0..PRESENCE_ATTEMPTS)
        .find_map(|_| transport.request())
        .ok_or_else(Error::no_card)?;
    if tag_type.is_classic() {
        trace!(%tag_type, "Card detected");
    } else {
        debug!(%tag_type, "Card detected, but it is not a MIFARE Classic tag");
    }

    let uid = transport
        .anticollision()
        .ok_or_else(|| Error::read_write("Anti-collision did not return a UID"))?;

    if let Some(expected) = required_uid {
        if *expected != uid {
            return Err(Error::wrong_card(expected.clone(), uid));
        }
    }

    if !transport.select_tag(&uid) {
        return Err(Error::AccessDenied { uid });
    }
    Ok(uid)
}

/// Stops the crypto session of the wrapped transport when dropped
struct CryptoGuard<'a, T: CardTransport> {
    transport: &'a mut T,
}

impl<'a, T: CardTransport> CryptoGuard<'a, T> {
    const fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }
}

impl<T: CardTransport> Deref for CryptoGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.transport
    }
}

impl<T: CardTransport> DerefMut for CryptoGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.transport
    }
}

impl<T: CardTransport> Drop for CryptoGuard<'_, T> {
    fn drop(&mut self) {
        self.transport.stop_crypto();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use relaylock_mifare_core::transport::{MockTransport, TransportCall};
    use relaylock_mifare_core::{NoCardReason, Sector, TagType};

    use super::*;

    const CUSTOM: SectorKey = SectorKey::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);

    fn controller(transport: &MockTransport) -> CardController<MockTransport> {
        CardController::new(transport.clone(), CUSTOM, "prefix")
    }

    fn read_meta(session: &mut SectorSession<'_>) -> Result<String> {
        session.read_sector(Sector::new(1))
    }

    #[test]
    fn test_default_key_first() {
        let transport = MockTransport::new();
        let ctl = controller(&transport);
        let key = ctl.with_card(None, None, |s| Ok(*s.key())).unwrap();
        assert_eq!(key, SectorKey::DEFAULT);
        assert_eq!(ctl.key_candidates(None), vec![SectorKey::DEFAULT, CUSTOM]);
    }

    #[test]
    fn test_falls_back_to_custom_key() {
        let transport = MockTransport::new().with_key(1..=4, CUSTOM);
        let ctl = controller(&transport);

        let key = ctl
            .with_card(None, None, |s| {
                read_meta(s)?;
                Ok(*s.key())
            })
            .unwrap();
        assert_eq!(key, CUSTOM);
        // The tag is detected and selected again for the second candidate
        assert_eq!(transport.count(|c| *c == TransportCall::Select), 2);
        assert_eq!(transport.count(|c| *c == TransportCall::StopCrypto), 2);
    }

    #[test]
    fn test_neither_key_fails_with_authentication_failure() {
        let other = SectorKey::new([9; 6]);
        let transport = MockTransport::new().with_key(1..=4, other);
        let ctl = controller(&transport);

        let err = ctl.with_card(None, None, read_meta).unwrap_err();
        assert_eq!(
            err,
            Error::AuthenticationFailure(
                "cannot access RFID card 0x04A1B2C3 with known keys".into()
            )
        );
        assert_eq!(
            transport.count(|c| matches!(c, TransportCall::Authenticate { .. })),
            2
        );
    }

    #[test]
    fn test_forced_key_is_the_only_candidate() {
        let transport = MockTransport::new().with_key(1..=4, CUSTOM);
        let ctl = controller(&transport);

        let err = ctl
            .with_card(None, Some(SectorKey::DEFAULT), read_meta)
            .unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailure(_)));
        assert_eq!(transport.count(|c| *c == TransportCall::Select), 1);
    }

    #[test]
    fn test_presence_retried_three_times() {
        let transport = MockTransport::new().with_request_failures(2);
        let ctl = controller(&transport);
        assert!(ctl.with_card(None, None, |_| Ok(())).is_ok());

        let transport = MockTransport::new().absent();
        let ctl = controller(&transport);
        let err = ctl.with_card(None, None, |_| Ok(())).unwrap_err();
        assert_eq!(err, Error::no_card());
        // Presence does not depend on the key: no second candidate
        assert_eq!(transport.count(|c| *c == TransportCall::Request), 3);
    }

    #[test]
    fn test_wrong_card_is_not_tried_with_other_keys() {
        let transport = MockTransport::new();
        let ctl = controller(&transport);
        let expected: CardUid = "0x01020304".parse().unwrap();

        let err = ctl
            .with_card(Some(&expected), None, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NoCardDetected {
                reason: NoCardReason::UidMismatch { .. }
            }
        ));
        assert_eq!(transport.count(|c| *c == TransportCall::Anticollision), 1);
        assert_eq!(transport.count(|c| *c == TransportCall::Select), 0);
    }

    #[test]
    fn test_anticollision_and_select_failures() {
        let transport = MockTransport::new().with_failing_anticollision();
        let err = controller(&transport)
            .with_card(None, None, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::ReadWriteFailure(_)));
        assert_eq!(transport.count(|c| *c == TransportCall::Request), 1);

        let transport = MockTransport::new().with_failing_select();
        let err = controller(&transport)
            .with_card(None, None, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied { .. }));
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let transport = MockTransport::new();
        let ctl = controller(&transport);
        let mut runs = 0;

        let err = ctl
            .with_card(None, None, |_| -> Result<()> {
                runs += 1;
                Err(Error::metadata("foreign card"))
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedMetaData(_)));
        assert_eq!(runs, 1);
        assert_eq!(transport.count(|c| *c == TransportCall::StopCrypto), 1);
    }

    #[test]
    fn test_crypto_torn_down_after_every_attempt() {
        let transport = MockTransport::new();
        let ctl = controller(&transport);

        ctl.with_card(None, None, read_meta).unwrap();
        let calls: Vec<_> = transport.calls().into_iter().map(|c| c.call).collect();
        assert_eq!(calls.last(), Some(&TransportCall::StopCrypto));

        transport.clear_calls();
        transport.remove();
        let _ = ctl.with_card(None, None, read_meta);
        assert_eq!(transport.count(|c| *c == TransportCall::StopCrypto), 1);
    }

    #[test]
    fn test_sessions_never_interleave() {
        let transport = MockTransport::new().with_latency(Duration::from_millis(1));
        let ctl = Arc::new(controller(&transport));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let ctl = Arc::clone(&ctl);
                thread::spawn(move || {
                    for _ in 0..3 {
                        ctl.with_card(None, None, |s| {
                            s.write_sector(Sector::new(2), "alice")?;
                            s.read_sector(Sector::new(2))
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Each session is one contiguous run of calls from one thread,
        // starting with the presence request and ending with the teardown
        let calls = transport.calls();
        let sessions: Vec<_> = calls
            .split_inclusive(|c| c.call == TransportCall::StopCrypto)
            .collect();
        assert_eq!(sessions.len(), 6);
        for session in sessions {
            assert_eq!(session[0].call, TransportCall::Request);
            let threads: HashSet<_> = session.iter().map(|c| c.thread).collect();
            assert_eq!(threads.len(), 1);
        }
    }

    #[test]
    fn test_long_uids_and_other_tag_types() {
        for (bytes, tag_type) in [
            (vec![0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66], TagType::Ultralight),
            (vec![0x08, 1, 2, 3, 4, 5, 6, 7, 8, 9], TagType::Classic4K),
        ] {
            let uid = CardUid::new(bytes).unwrap();
            let transport = MockTransport::new()
                .with_uid(uid.clone())
                .with_tag_type(tag_type);
            let ctl = controller(&transport);

            let seen = ctl
                .with_card(Some(&uid), None, |session| Ok(session.uid().clone()))
                .unwrap();
            assert_eq!(seen, uid);
            // Blank data sectors authenticate and read under the long UID
            assert!(matches!(
                ctl.read_record(Some(&uid), None),
                Err(Error::UnexpectedMetaData(_))
            ));
        }
    }
}
