//! Raw ROM SPI-flash access for the NVS partition and the credential sector.

use bringup_core::{
    provisioning::CredentialStore,
    storage::{
        NVS_PAGE_HEADER_LEN, NVS_PAGE_SIZE, NvsLayout, NvsPageHeader, Storage, StorageError,
        classify_nvs_pages,
    },
};
use embedded_storage::{ReadStorage, Storage as WriteStorage};
use esp_bootloader_esp_idf::partitions::{
    DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType, read_partition_table,
};
use esp_rom_sys::rom::spiflash::{
    ESP_ROM_SPIFLASH_RESULT_OK, esp_rom_spiflash_erase_sector, esp_rom_spiflash_read,
    esp_rom_spiflash_unlock, esp_rom_spiflash_write,
};
use heapless::Vec;
use log::{debug, info};

const FLASH_SECTOR_SIZE: u32 = 4096;
const DEFAULT_FLASH_CAPACITY_BYTES: usize = 4 * 1024 * 1024;
const MAX_NVS_PAGES: usize = 64;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashError {
    PartitionTable,
    PartitionMissing,
    PartitionTooSmall,
    FlashOpFailed(i32),
    Unaligned,
    ShortRead,
}

impl From<FlashError> for StorageError {
    fn from(err: FlashError) -> Self {
        match err {
            FlashError::PartitionMissing => StorageError::NotFound,
            FlashError::FlashOpFailed(rc) => StorageError::Flash(rc),
            _ => StorageError::Flash(-1),
        }
    }
}

/// Byte range of one partition.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Region {
    pub offset: u32,
    pub len: u32,
}

impl Region {
    pub const fn sectors(&self) -> u32 {
        self.len / FLASH_SECTOR_SIZE
    }

    pub const fn last_sector(&self) -> u32 {
        self.offset + self.len - FLASH_SECTOR_SIZE
    }
}

/// Partitions the bring-up cares about.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PartitionLayout {
    pub nvs: Option<Region>,
    /// First writable `Data(Undefined)` partition.
    pub credentials: Option<Region>,
}

impl PartitionLayout {
    pub fn read() -> Result<Self, FlashError> {
        let mut flash = RawFlash::new()?;
        let mut table_buf = [0u8; PARTITION_TABLE_MAX_LEN];
        let table = read_partition_table(&mut flash, &mut table_buf)
            .map_err(|_| FlashError::PartitionTable)?;

        let mut layout = Self::default();
        for entry in table.iter() {
            if entry.is_read_only() || entry.len() < FLASH_SECTOR_SIZE {
                continue;
            }

            let region = Region {
                offset: entry.offset(),
                len: entry.len(),
            };
            match entry.partition_type() {
                PartitionType::Data(DataPartitionSubType::Nvs) if layout.nvs.is_none() => {
                    layout.nvs = Some(region);
                }
                PartitionType::Data(DataPartitionSubType::Undefined)
                    if layout.credentials.is_none() =>
                {
                    layout.credentials = Some(region);
                }
                _ => {}
            }
        }

        debug!(
            "flash: nvs={:?} credentials={:?}",
            layout.nvs, layout.credentials
        );
        Ok(layout)
    }
}

#[derive(Debug)]
struct RawFlash;

impl RawFlash {
    fn new() -> Result<Self, FlashError> {
        let rc = unsafe { esp_rom_spiflash_unlock() };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashError::FlashOpFailed(rc));
        }
        Ok(Self)
    }

    fn erase_sector(&mut self, sector_addr: u32) -> Result<(), FlashError> {
        if !sector_addr.is_multiple_of(FLASH_SECTOR_SIZE) {
            return Err(FlashError::Unaligned);
        }

        let rc = unsafe { esp_rom_spiflash_erase_sector(sector_addr / FLASH_SECTOR_SIZE) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashError::FlashOpFailed(rc));
        }
        Ok(())
    }

    fn read_word(&mut self, addr: u32) -> Result<u32, FlashError> {
        let mut word = 0u32;
        let rc = unsafe { esp_rom_spiflash_read(addr, &mut word as *mut u32 as *const u32, 4) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashError::FlashOpFailed(rc));
        }
        Ok(word)
    }

    fn write_word(&mut self, addr: u32, word: u32) -> Result<(), FlashError> {
        let rc = unsafe { esp_rom_spiflash_write(addr, &word as *const u32, 4) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashError::FlashOpFailed(rc));
        }
        Ok(())
    }

    /// Word-granular read of an arbitrary byte range.
    fn read_bytes(&mut self, addr: u32, out: &mut [u8]) -> Result<(), FlashError> {
        let start = addr & !0b11;
        let end = (addr + out.len() as u32 + 3) & !0b11;
        let mut filled = 0usize;

        for word_addr in (start..end).step_by(4) {
            let bytes = self.read_word(word_addr)?.to_le_bytes();
            for (i, b) in bytes.iter().enumerate() {
                let at = word_addr + i as u32;
                if at < addr {
                    continue;
                }
                let dst = (at - addr) as usize;
                if dst >= out.len() {
                    break;
                }
                out[dst] = *b;
                filled += 1;
            }
        }

        if filled == out.len() {
            Ok(())
        } else {
            Err(FlashError::ShortRead)
        }
    }

    /// Program bytes into an already erased, word-aligned range.
    fn write_erased_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashError::Unaligned);
        }

        for (i, chunk) in data.chunks(4).enumerate() {
            let mut bytes = [0xFFu8; 4];
            bytes[..chunk.len()].copy_from_slice(chunk);
            self.write_word(addr + (i as u32) * 4, u32::from_le_bytes(bytes))?;
        }
        Ok(())
    }
}

impl ReadStorage for RawFlash {
    type Error = FlashError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_bytes(offset, bytes)
    }

    fn capacity(&self) -> usize {
        DEFAULT_FLASH_CAPACITY_BYTES
    }
}

impl WriteStorage for RawFlash {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.write_erased_bytes(offset, bytes)
    }
}

/// NVS data partition. Located lazily so a missing partition table surfaces
/// through [`Storage::init`].
#[derive(Debug, Default)]
pub struct NvsFlash {
    region: Option<Region>,
    layout: Option<NvsLayout>,
}

impl NvsFlash {
    pub const fn new() -> Self {
        Self {
            region: None,
            layout: None,
        }
    }

    /// Page summary from the last successful init.
    pub fn layout(&self) -> Option<NvsLayout> {
        self.layout
    }

    fn region(&mut self) -> Result<Region, FlashError> {
        if let Some(region) = self.region {
            return Ok(region);
        }
        let region = PartitionLayout::read()?
            .nvs
            .ok_or(FlashError::PartitionMissing)?;
        self.region = Some(region);
        Ok(region)
    }
}

impl Storage for NvsFlash {
    fn init(&mut self) -> Result<(), StorageError> {
        let region = self.region()?;
        let mut flash = RawFlash::new()?;

        let mut headers: Vec<NvsPageHeader, MAX_NVS_PAGES> = Vec::new();
        for page in 0..region.sectors() {
            let mut raw = [0u8; NVS_PAGE_HEADER_LEN];
            flash.read_bytes(region.offset + page * NVS_PAGE_SIZE, &mut raw)?;
            if headers.push(NvsPageHeader::parse(&raw)).is_err() {
                break;
            }
        }

        let layout = classify_nvs_pages(headers)?;
        info!(
            "nvs: {} pages ({} active, {} free)",
            layout.pages, layout.active_pages, layout.free_pages
        );
        self.layout = Some(layout);
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        let region = self.region()?;
        let mut flash = RawFlash::new()?;
        for sector in 0..region.sectors() {
            flash.erase_sector(region.offset + sector * FLASH_SECTOR_SIZE)?;
        }
        self.layout = None;
        Ok(())
    }
}

/// Last sector of the credential partition.
#[derive(Debug)]
pub struct CredentialSector {
    flash: RawFlash,
    sector_addr: u32,
}

impl CredentialSector {
    pub fn new(region: Region) -> Result<Self, FlashError> {
        if region.len < FLASH_SECTOR_SIZE {
            return Err(FlashError::PartitionTooSmall);
        }
        Ok(Self {
            flash: RawFlash::new()?,
            sector_addr: region.last_sector(),
        })
    }
}

impl CredentialStore for CredentialSector {
    type Error = FlashError;

    fn read_record(&mut self, out: &mut [u8]) -> Result<(), Self::Error> {
        if out.len() > FLASH_SECTOR_SIZE as usize {
            return Err(FlashError::PartitionTooSmall);
        }
        self.flash.read_bytes(self.sector_addr, out)
    }

    fn write_record(&mut self, record: &[u8]) -> Result<(), Self::Error> {
        if record.len() > FLASH_SECTOR_SIZE as usize {
            return Err(FlashError::PartitionTooSmall);
        }
        self.flash.erase_sector(self.sector_addr)?;
        self.flash.write_erased_bytes(self.sector_addr, record)
    }
}
