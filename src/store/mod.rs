//! Persistent credential store
//!
//! A `{host, device credentials, device id}` record encoded into a fixed
//! 512-byte non-volatile region. All multi-byte content is raw UTF-8;
//! lengths are 8-bit prefixes at fixed offsets.
//!
//! Region layout:
//!   offset 0: host length (1 byte)
//!   offset 1: device credentials length (1 byte)
//!   offset 2: device id length (1 byte)
//!   offset 3: host bytes, then credentials bytes, then device id bytes
//!
//! Each stored field is its string bytes plus one 0 terminator, and the
//! length prefix counts both — so a single field caps out at 254 bytes.
//! Length 255 is the erased/unset sentinel: a freshly erased region is
//! all 0xFF, which reads back as "no record" with no special casing.

pub mod region;

use base64::Engine;
use thiserror::Error;

use region::{NvRegion, ERASED, REGION_SIZE};

/// Offsets of the three length prefixes
const HOST_LEN: usize = 0;
const CREDENTIALS_LEN: usize = 1;
const DEVICE_ID_LEN: usize = 2;

/// First payload byte
const PAYLOAD: usize = 3;

/// Largest value a length prefix can hold; 255 is the sentinel
const MAX_FIELD: usize = 254;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The record would exceed the region. Fatal to the calling
    /// operation — retrying cannot change the outcome.
    #[error("credential record does not fit the {REGION_SIZE}-byte region")]
    TooLarge,

    /// No structurally valid record in the region. Triggers
    /// re-provisioning, not an error surfaced to the operator.
    #[error("no valid credential record in the region")]
    NotFound,

    #[error("region i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// The in-memory copy of a persisted record.
///
/// `credentials` is the Base64 of `tenantId/username:password`, ready to
/// be placed after `Basic ` in an Authorization header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub host: String,
    pub credentials: String,
}

/// Encoder/decoder for the credential region.
///
/// Owns all bounds enforcement; nothing else touches the persisted
/// bytes. Budget checks run before any byte is written, so a rejected
/// save leaves the previous record fully intact.
pub struct CredentialStore<R: NvRegion> {
    region: R,
}

impl<R: NvRegion> CredentialStore<R> {
    pub fn new(region: R) -> Self {
        Self { region }
    }

    /// Encode and persist host plus freshly issued credentials.
    ///
    /// Builds `tenantId/username:password`, Base64-encodes it, validates
    /// the budget, writes both fields and commits. The device id length
    /// is reset to the sentinel: credentials from a new bootstrap
    /// exchange invalidate any earlier registration.
    pub fn save(
        &mut self,
        host: &str,
        tenant_id: &str,
        username: &str,
        password: &str,
    ) -> Result<CredentialRecord, StoreError> {
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{tenant_id}/{username}:{password}"));

        let host_len = host.len() + 1;
        let credentials_len = credentials.len() + 1;
        if host_len > MAX_FIELD
            || credentials_len > MAX_FIELD
            || PAYLOAD + host_len + credentials_len > REGION_SIZE
        {
            return Err(StoreError::TooLarge);
        }

        self.region
            .write_at(HOST_LEN, &[host_len as u8, credentials_len as u8, ERASED]);
        self.write_field(PAYLOAD, host.as_bytes());
        self.write_field(PAYLOAD + host_len, credentials.as_bytes());
        self.region.commit()?;

        Ok(CredentialRecord {
            host: host.to_string(),
            credentials,
        })
    }

    /// Persist the platform-assigned device identifier.
    ///
    /// Re-validates the combined budget against the host/credentials
    /// lengths already in the region. A `TooLarge` rejection leaves
    /// those fields untouched.
    pub fn save_device_id(&mut self, id: &str) -> Result<(), StoreError> {
        let (host_len, credentials_len) = self.stored_lengths()?;

        let id_len = id.len() + 1;
        if id_len > MAX_FIELD || PAYLOAD + host_len + credentials_len + id_len > REGION_SIZE {
            return Err(StoreError::TooLarge);
        }

        self.region.write_at(DEVICE_ID_LEN, &[id_len as u8]);
        self.write_field(PAYLOAD + host_len + credentials_len, id.as_bytes());
        self.region.commit()?;
        Ok(())
    }

    /// Decode the host and credentials fields into fresh owned strings.
    pub fn load(&self) -> Result<CredentialRecord, StoreError> {
        let (host_len, credentials_len) = self.stored_lengths()?;

        let host = self.read_field(PAYLOAD, host_len)?;
        let credentials = self.read_field(PAYLOAD + host_len, credentials_len)?;
        Ok(CredentialRecord { host, credentials })
    }

    /// Decode the device id field. Its offset depends on the stored
    /// host/credentials lengths, so those must be valid too.
    pub fn load_device_id(&self) -> Result<String, StoreError> {
        let (host_len, credentials_len) = self.stored_lengths()?;

        let id_len = self.length_at(DEVICE_ID_LEN)?;
        if PAYLOAD + host_len + credentials_len + id_len > REGION_SIZE {
            return Err(StoreError::NotFound);
        }
        self.read_field(PAYLOAD + host_len + credentials_len, id_len)
    }

    /// Flood the region with the erased sentinel and commit. Idempotent.
    pub fn erase(&mut self) -> Result<(), StoreError> {
        self.region.write_at(0, &[ERASED; REGION_SIZE]);
        self.region.commit()?;
        Ok(())
    }

    /// The validated host/credentials length prefixes.
    ///
    /// Sentinel or zero lengths mean "structurally absent": a record
    /// with an empty host or empty credentials is never valid.
    fn stored_lengths(&self) -> Result<(usize, usize), StoreError> {
        let host_len = self.length_at(HOST_LEN)?;
        let credentials_len = self.length_at(CREDENTIALS_LEN)?;
        if PAYLOAD + host_len + credentials_len > REGION_SIZE {
            return Err(StoreError::NotFound);
        }
        Ok((host_len, credentials_len))
    }

    fn length_at(&self, offset: usize) -> Result<usize, StoreError> {
        let mut len = [0u8; 1];
        self.region.read_at(offset, &mut len);
        match len[0] {
            // 1 is an empty string (terminator only); empty fields are
            // never valid
            0 | 1 | ERASED => Err(StoreError::NotFound),
            n => Ok(n as usize),
        }
    }

    /// Write a field's string bytes plus its terminator
    fn write_field(&mut self, offset: usize, bytes: &[u8]) {
        self.region.write_at(offset, bytes);
        self.region.write_at(offset + bytes.len(), &[0]);
    }

    /// Read a field of `len` bytes (terminator included) back into an
    /// owned string
    fn read_field(&self, offset: usize, len: usize) -> Result<String, StoreError> {
        let mut bytes = vec![0u8; len];
        self.region.read_at(offset, &mut bytes);
        bytes.pop(); // terminator
        String::from_utf8(bytes).map_err(|_| StoreError::NotFound)
    }
}
