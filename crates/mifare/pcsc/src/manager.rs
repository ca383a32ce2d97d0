//! Discovery and opening of PC/SC readers

use std::ffi::CStr;

use pcsc::{Context, ReaderState, Scope, State};

use crate::config::PcscConfig;
use crate::error::PcscError;
use crate::reader::PcscReader;
use crate::transport::PcscTransport;

/// Entry point to the PC/SC service
#[allow(missing_debug_implementations)]
pub struct PcscDeviceManager {
    context: Context,
}

impl PcscDeviceManager {
    /// Connect to the PC/SC service in user scope
    pub fn new() -> Result<Self, PcscError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }

    /// Attached readers and the tags in their fields
    pub fn list_readers(&self) -> Result<Vec<PcscReader>, PcscError> {
        let names = self.context.list_readers_owned()?;
        if names.is_empty() {
            return Err(PcscError::NoReadersAvailable);
        }
        Ok(names.iter().map(|name| self.probe(name)).collect())
    }

    fn probe(&self, name: &CStr) -> PcscReader {
        let mut states = [ReaderState::new(name, State::UNAWARE)];
        match self.context.get_status_change(None, &mut states) {
            Ok(()) => PcscReader::from_reader_state(&states[0]),
            // A reader that cannot report its state is treated as empty
            Err(_) => PcscReader::new(name.to_string_lossy().into_owned(), None),
        }
    }

    /// Open the reader called `reader_name` with the default configuration
    pub fn open_reader(&self, reader_name: &str) -> Result<PcscTransport, PcscError> {
        self.open_reader_with_config(reader_name, PcscConfig::default())
    }

    /// Open the reader called `reader_name`
    ///
    /// No connection to a tag is made until the first presence request.
    pub fn open_reader_with_config(
        &self,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<PcscTransport, PcscError> {
        if !self.list_readers()?.iter().any(|r| r.name() == reader_name) {
            return Err(PcscError::ReaderNotFound(reader_name.to_string()));
        }
        PcscTransport::new(self.context.clone(), reader_name, config)
    }

    /// Open the named reader, or the first attached one
    pub fn open(
        &self,
        reader_name: Option<&str>,
        config: PcscConfig,
    ) -> Result<PcscTransport, PcscError> {
        if let Some(name) = reader_name {
            return self.open_reader_with_config(name, config);
        }
        let readers = self.list_readers()?;
        let first = readers.first().ok_or(PcscError::NoReadersAvailable)?;
        PcscTransport::new(self.context.clone(), first.name(), config)
    }
}
