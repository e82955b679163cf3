//! Non-volatile storage bring-up.

use log::{info, warn};

pub const NVS_PAGE_SIZE: u32 = 4096;
pub const NVS_PAGE_HEADER_LEN: usize = 32;
/// Page format version written by the current NVS layout.
pub const NVS_FORMAT_VERSION: u8 = 0xFE;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageError {
    /// Every NVS page is in use.
    NoFreePages,
    /// Pages were written by an incompatible NVS format.
    NewVersionFound,
    /// No NVS partition in the partition table.
    NotFound,
    /// Raw flash operation failed with the given ROM code.
    Flash(i32),
}

impl StorageError {
    /// Errors cleared by erasing the partition.
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::NoFreePages | Self::NewVersionFound)
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoFreePages => f.write_str("no free NVS pages"),
            Self::NewVersionFound => f.write_str("NVS partition has a newer format"),
            Self::NotFound => f.write_str("NVS partition not found"),
            Self::Flash(rc) => write!(f, "flash operation failed (rc={rc})"),
        }
    }
}

/// Persistent key-value storage partition.
pub trait Storage {
    fn init(&mut self) -> Result<(), StorageError>;
    fn erase(&mut self) -> Result<(), StorageError>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageInit {
    Clean,
    /// Init succeeded after erasing the partition once.
    Recovered(StorageError),
}

/// Initialize storage, erasing and retrying exactly once on a recoverable error.
pub fn init_storage<S: Storage>(storage: &mut S) -> Result<StorageInit, StorageError> {
    match storage.init() {
        Ok(()) => Ok(StorageInit::Clean),
        Err(err) if err.is_recoverable() => {
            warn!("nvs: init failed ({}); erasing partition", err);
            storage.erase()?;
            storage.init()?;
            info!("nvs: partition erased and re-initialized");
            Ok(StorageInit::Recovered(err))
        }
        Err(err) => Err(err),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NvsPageState {
    Uninitialized,
    Active,
    Full,
    Freeing,
    Corrupt,
    Invalid,
}

impl NvsPageState {
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0xFFFF_FFFF => Self::Uninitialized,
            0xFFFF_FFFE => Self::Active,
            0xFFFF_FFFC => Self::Full,
            0xFFFF_FFF8 => Self::Freeing,
            0xFFFF_FFF0 => Self::Corrupt,
            _ => Self::Invalid,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NvsPageHeader {
    pub state: NvsPageState,
    pub sequence: u32,
    pub version: u8,
}

impl NvsPageHeader {
    pub fn parse(raw: &[u8; NVS_PAGE_HEADER_LEN]) -> Self {
        Self {
            state: NvsPageState::from_raw(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
            sequence: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            version: raw[8],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NvsLayout {
    pub pages: u16,
    pub free_pages: u16,
    pub active_pages: u16,
}

/// Validate NVS page headers the way the storage driver does at init.
///
/// A written page with a foreign format version wins over a full partition.
pub fn classify_nvs_pages<I>(headers: I) -> Result<NvsLayout, StorageError>
where
    I: IntoIterator<Item = NvsPageHeader>,
{
    let mut layout = NvsLayout::default();
    let mut foreign_version = false;

    for header in headers {
        layout.pages = layout.pages.saturating_add(1);
        match header.state {
            NvsPageState::Uninitialized => {
                layout.free_pages = layout.free_pages.saturating_add(1);
                continue;
            }
            NvsPageState::Active => {
                layout.active_pages = layout.active_pages.saturating_add(1);
            }
            _ => {}
        }

        if header.version != NVS_FORMAT_VERSION
            && matches!(
                header.state,
                NvsPageState::Active | NvsPageState::Full | NvsPageState::Freeing
            )
        {
            foreign_version = true;
        }
    }

    if foreign_version {
        return Err(StorageError::NewVersionFound);
    }
    if layout.free_pages == 0 {
        return Err(StorageError::NoFreePages);
    }
    Ok(layout)
}
