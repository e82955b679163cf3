//! Dev-mode device credential provisioning.
//!
//! Credentials baked into the image are written to a flash record on first
//! boot (or whenever they change) so the demos can read them back.

use log::{info, warn};

pub const CREDENTIAL_RECORD_MAGIC: u32 = 0x314B_4641; // "AFK1"
pub const CREDENTIAL_RECORD_VERSION: u8 = 1;
pub const CREDENTIAL_HEADER_LEN: usize = 16;
pub const CREDENTIAL_CHECKSUM_LEN: usize = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceCredentials<'a> {
    pub thing_name: &'a str,
    pub endpoint: &'a str,
    pub client_cert_pem: &'a str,
    pub private_key_pem: &'a str,
}

impl<'a> DeviceCredentials<'a> {
    pub const fn new(
        thing_name: &'a str,
        endpoint: &'a str,
        client_cert_pem: &'a str,
        private_key_pem: &'a str,
    ) -> Self {
        Self {
            thing_name,
            endpoint,
            client_cert_pem,
            private_key_pem,
        }
    }

    /// A usable identity needs both a certificate and its key.
    pub fn is_complete(&self) -> bool {
        !self.client_cert_pem.is_empty() && !self.private_key_pem.is_empty()
    }

    pub fn encoded_len(&self) -> usize {
        CREDENTIAL_HEADER_LEN
            + self.thing_name.len()
            + self.endpoint.len()
            + self.client_cert_pem.len()
            + self.private_key_pem.len()
            + CREDENTIAL_CHECKSUM_LEN
    }

    fn fields(&self) -> [&'a str; 4] {
        [
            self.thing_name,
            self.endpoint,
            self.client_cert_pem,
            self.private_key_pem,
        ]
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordError {
    TooLarge { needed: usize, capacity: usize },
    Corrupted,
}

pub fn encode_credentials(
    credentials: &DeviceCredentials<'_>,
    out: &mut [u8],
) -> Result<usize, RecordError> {
    let needed = credentials.encoded_len();
    if needed > out.len() {
        return Err(RecordError::TooLarge {
            needed,
            capacity: out.len(),
        });
    }

    let mut header = [0u8; CREDENTIAL_HEADER_LEN];
    header[0..4].copy_from_slice(&CREDENTIAL_RECORD_MAGIC.to_le_bytes());
    header[4] = CREDENTIAL_RECORD_VERSION;
    for (i, field) in credentials.fields().iter().enumerate() {
        let len = u16::try_from(field.len()).map_err(|_| RecordError::TooLarge {
            needed,
            capacity: out.len(),
        })?;
        let at = 6 + i * 2;
        header[at..at + 2].copy_from_slice(&len.to_le_bytes());
    }
    out[..CREDENTIAL_HEADER_LEN].copy_from_slice(&header);

    let mut cursor = CREDENTIAL_HEADER_LEN;
    for field in credentials.fields() {
        out[cursor..cursor + field.len()].copy_from_slice(field.as_bytes());
        cursor += field.len();
    }

    let checksum = checksum32(&out[..cursor]);
    out[cursor..cursor + CREDENTIAL_CHECKSUM_LEN].copy_from_slice(&checksum.to_le_bytes());
    Ok(cursor + CREDENTIAL_CHECKSUM_LEN)
}

/// Decode a stored record. Erased flash, a foreign magic or an unknown
/// version decode as `None`.
pub fn decode_credentials(buf: &[u8]) -> Result<Option<DeviceCredentials<'_>>, RecordError> {
    if buf.len() < CREDENTIAL_HEADER_LEN + CREDENTIAL_CHECKSUM_LEN {
        return Ok(None);
    }

    let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != CREDENTIAL_RECORD_MAGIC || buf[4] != CREDENTIAL_RECORD_VERSION {
        return Ok(None);
    }

    let mut lens = [0usize; 4];
    for (i, len) in lens.iter_mut().enumerate() {
        let at = 6 + i * 2;
        *len = u16::from_le_bytes([buf[at], buf[at + 1]]) as usize;
    }
    let payload_end = CREDENTIAL_HEADER_LEN + lens.iter().sum::<usize>();
    if payload_end + CREDENTIAL_CHECKSUM_LEN > buf.len() {
        return Err(RecordError::Corrupted);
    }

    let expected = u32::from_le_bytes([
        buf[payload_end],
        buf[payload_end + 1],
        buf[payload_end + 2],
        buf[payload_end + 3],
    ]);
    if checksum32(&buf[..payload_end]) != expected {
        return Err(RecordError::Corrupted);
    }

    let mut fields = [""; 4];
    let mut cursor = CREDENTIAL_HEADER_LEN;
    for (field, len) in fields.iter_mut().zip(lens) {
        *field = core::str::from_utf8(&buf[cursor..cursor + len])
            .map_err(|_| RecordError::Corrupted)?;
        cursor += len;
    }

    Ok(Some(DeviceCredentials::new(
        fields[0], fields[1], fields[2], fields[3],
    )))
}

/// Encoded length of the record at the start of `buf`, from its header alone.
pub fn stored_record_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < CREDENTIAL_HEADER_LEN {
        return None;
    }
    let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != CREDENTIAL_RECORD_MAGIC || buf[4] != CREDENTIAL_RECORD_VERSION {
        return None;
    }

    let payload: usize = (0..4)
        .map(|i| u16::from_le_bytes([buf[6 + i * 2], buf[7 + i * 2]]) as usize)
        .sum();
    Some(CREDENTIAL_HEADER_LEN + payload + CREDENTIAL_CHECKSUM_LEN)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum StoredRecord {
    Empty,
    Same,
    /// A valid header for credentials of a different size.
    Changed { stored: usize },
    Unreadable(RecordError),
}

/// `scratch` holds at least `credentials.encoded_len()` bytes read from flash.
fn classify_stored(scratch: &[u8], credentials: &DeviceCredentials<'_>) -> StoredRecord {
    let needed = credentials.encoded_len();
    if let Some(stored) = stored_record_len(scratch)
        && stored != needed
    {
        return StoredRecord::Changed { stored };
    }

    match decode_credentials(&scratch[..needed]) {
        Ok(Some(existing)) if existing == *credentials => StoredRecord::Same,
        Ok(Some(_)) => StoredRecord::Changed { stored: needed },
        Ok(None) => StoredRecord::Empty,
        Err(err) => StoredRecord::Unreadable(err),
    }
}

/// Flash region holding the credential record.
pub trait CredentialStore {
    type Error: core::fmt::Debug;

    /// Fill `out` from the start of the record region.
    fn read_record(&mut self, out: &mut [u8]) -> Result<(), Self::Error>;
    fn write_record(&mut self, record: &[u8]) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProvisioningResult {
    /// Image carries no certificate/key pair.
    NoCredentials,
    AlreadyProvisioned,
    Written { len: usize },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProvisioningError<E> {
    Store(E),
    Record(RecordError),
}

/// Write `credentials` unless an identical record is already stored.
///
/// `scratch` must be large enough for the encoded record.
pub fn provision_credentials<S: CredentialStore>(
    store: &mut S,
    credentials: &DeviceCredentials<'_>,
    scratch: &mut [u8],
) -> Result<ProvisioningResult, ProvisioningError<S::Error>> {
    if !credentials.is_complete() {
        warn!("provisioning: no certificate/key pair in image");
        return Ok(ProvisioningResult::NoCredentials);
    }

    let needed = credentials.encoded_len();
    if needed > scratch.len() {
        return Err(ProvisioningError::Record(RecordError::TooLarge {
            needed,
            capacity: scratch.len(),
        }));
    }

    store
        .read_record(scratch)
        .map_err(ProvisioningError::Store)?;
    match classify_stored(scratch, credentials) {
        StoredRecord::Same => {
            info!("provisioning: credentials for {} already stored", credentials.thing_name);
            return Ok(ProvisioningResult::AlreadyProvisioned);
        }
        StoredRecord::Empty => {}
        StoredRecord::Changed { stored } => info!(
            "provisioning: stored credentials changed ({} -> {} bytes); rewriting",
            stored, needed
        ),
        StoredRecord::Unreadable(err) => {
            warn!("provisioning: stored record unreadable ({:?}); rewriting", err)
        }
    }

    let len = encode_credentials(credentials, scratch).map_err(ProvisioningError::Record)?;
    store
        .write_record(&scratch[..len])
        .map_err(ProvisioningError::Store)?;
    info!(
        "provisioning: wrote credentials for {} ({} bytes)",
        credentials.thing_name, len
    );
    Ok(ProvisioningResult::Written { len })
}

pub fn checksum32(bytes: &[u8]) -> u32 {
    let mut hash = 0x811C9DC5u32;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
