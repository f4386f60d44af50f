//! OLE Compound File Binary reader.
//! Legacy .xls workbooks, and encrypted Office Open XML packages, are stored as
//! named streams inside one of these containers.

use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u32;
use crate::helpers::bytes::to_u64;
use crate::helpers::bytes::to_usize;
use crate::helpers::bytes::to_usize_iter;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use thiserror::Error;

/// Compound file signature
pub(crate) const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const HEADER_SIZE: usize = 512;
const DIRECTORY_SIZE: usize = 128;
const MINI_SECTOR_SIZE: usize = 64;
/// Streams smaller than this live in the mini stream
const MINI_STREAM_CUTOFF: usize = 4096;
const ROOT_ENTRY: &str = "Root Entry";
// Sector ids at or above this are markers: DIFAT, FAT, end of chain, free
const MAX_REG_SECT: usize = 0xFFFFFFFB;

#[derive(Error, Debug)]
pub(crate) enum CfbError {
    #[error("The file is corrupted or has an invalid compound file structure")]
    FileFormatError,

    #[error("Invalid compound file signature")]
    SignatureError,

    #[error("Invalid sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("Sector {0} is outside the file")]
    SectorError(usize),

    #[error("The number of double indirect file allocation table sectors is wrong: expect '{0}', actual '{1}'")]
    DoubleIndirectFileAllocationTableError(usize, usize),

    #[error("The number of file allocation table sectors is wrong: expect '{0}', actual '{1}'")]
    FileAllocationTableError(usize, usize),

    #[error("Empty root directory")]
    RootDirectoryError,
}

/// A parsed compound file: its directory plus both allocation tables.
pub(crate) struct Cfb {
    directories: HashMap<String, Directory>,
    file_allocation_table: Vec<usize>,
    sectors: Sectors,
    mini_file_allocation_table: Vec<usize>,
    mini_sectors: Sectors,
}

impl Cfb {
    pub(crate) fn new(data: &[u8]) -> Result<Cfb, CfbError> {
        let header = Header::new(data)?;
        let size = header.sector_size()?;
        // Sector 0 starts one sector in: the header is padded to a full sector.
        let sectors = Sectors { data: data.to_vec(), size, offset: size };
        let file_allocation_table = load_file_allocation_table(&sectors, &header)?;
        let directories = load_directories(&file_allocation_table, &sectors, &header)?;
        let mini_file_allocation_table = if header.mini_file_allocation_table_count > 0 {
            let table = read_chain(&file_allocation_table, &sectors, header.mini_file_allocation_table_start)?;
            to_usize_iter(&table).collect()
        } else {
            Vec::new()
        };
        let mini_data = match directories.get(ROOT_ENTRY) {
            Some(root) => {
                let mut data = read_chain(&file_allocation_table, &sectors, root.start)?;
                data.truncate(root.size);
                data
            }
            None => Vec::new(),
        };

        Ok(Cfb {
            directories,
            file_allocation_table,
            sectors,
            mini_file_allocation_table,
            mini_sectors: Sectors { data: mini_data, size: MINI_SECTOR_SIZE, offset: 0 },
        })
    }

    pub(crate) fn exists(&self, name: &str) -> bool {
        self.directories.contains_key(name)
    }

    /// Reads a whole stream by name; `None` when there is no such entry.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, CfbError> {
        let Some(directory) = self.directories.get(name) else {
            return Ok(None);
        };
        let mut bytes = if directory.size < MINI_STREAM_CUTOFF {
            read_chain(&self.mini_file_allocation_table, &self.mini_sectors, directory.start)?
        } else {
            read_chain(&self.file_allocation_table, &self.sectors, directory.start)?
        };
        if bytes.len() < directory.size {
            return Err(CfbError::FileFormatError);
        }
        bytes.truncate(directory.size);
        Ok(Some(bytes))
    }
}

/// Collects the file allocation table from the sectors the header and the
/// double indirect chain list.
fn load_file_allocation_table(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, CfbError> {
    let mut double_indirect: Vec<usize> = to_usize_iter(&sectors.data[76..HEADER_SIZE]).collect();
    let mut count = 0usize;
    let mut index = header.double_indirect_start;
    while index < MAX_REG_SECT && count <= header.double_indirect_count {
        double_indirect.extend(to_usize_iter(sectors.get(index)?));
        // Last entry of each double indirect sector points at the next one
        index = double_indirect.pop().ok_or(CfbError::FileFormatError)?;
        count += 1;
    }
    if count != header.double_indirect_count {
        return Err(CfbError::DoubleIndirectFileAllocationTableError(header.double_indirect_count, count));
    }

    let mut file_allocation_table = Vec::<usize>::new();
    let mut count = 0usize;
    for index in double_indirect.into_iter().filter(|index| *index < MAX_REG_SECT) {
        file_allocation_table.extend(to_usize_iter(sectors.get(index)?));
        count += 1;
    }
    if count != header.file_allocation_table_count {
        return Err(CfbError::FileAllocationTableError(header.file_allocation_table_count, count));
    }
    Ok(file_allocation_table)
}

fn load_directories(
    file_allocation_table: &[usize],
    sectors: &Sectors,
    header: &Header,
) -> Result<HashMap<String, Directory>, CfbError> {
    let bytes = read_chain(file_allocation_table, sectors, header.directory_start)?;
    let directories: HashMap<String, Directory> = bytes
        .chunks_exact(DIRECTORY_SIZE)
        .map(|entry| Directory::new(entry, header.major_version))
        .filter(|(name, _)| !name.is_empty())
        .collect();
    if directories.is_empty() {
        return Err(CfbError::RootDirectoryError);
    }
    Ok(directories)
}

/// Follows a sector chain from `start`, concatenating the sectors it visits.
fn read_chain(table: &[usize], sectors: &Sectors, start: usize) -> Result<Vec<u8>, CfbError> {
    let mut content = Vec::<u8>::new();
    let mut index = start;
    let mut steps = 0usize;
    while index < MAX_REG_SECT {
        if steps > table.len() {
            // A chain longer than the table has a cycle
            return Err(CfbError::FileFormatError);
        }
        content.extend_from_slice(sectors.get(index)?);
        index = *table.get(index).ok_or(CfbError::SectorError(index))?;
        steps += 1;
    }
    Ok(content)
}

/// Fixed-size sectors laid end to end after `offset` bytes.
struct Sectors {
    data: Vec<u8>,
    size: usize,
    offset: usize,
}

impl Sectors {
    fn get(&self, index: usize) -> Result<&[u8], CfbError> {
        let lower = index
            .checked_mul(self.size)
            .and_then(|lower| lower.checked_add(self.offset))
            .filter(|lower| *lower < self.data.len())
            .ok_or(CfbError::SectorError(index))?;
        let upper = self.data.len().min(lower + self.size);
        Ok(&self.data[lower..upper])
    }
}

struct Header {
    major_version: u16,
    sector_shift: u16,
    file_allocation_table_count: usize,
    directory_start: usize,
    mini_file_allocation_table_start: usize,
    mini_file_allocation_table_count: usize,
    double_indirect_start: usize,
    double_indirect_count: usize,
}

impl Header {
    fn new(data: &[u8]) -> Result<Self, CfbError> {
        if data.len() < HEADER_SIZE {
            return Err(CfbError::FileFormatError);
        }
        if data[0..8] != SIGNATURE {
            return Err(CfbError::SignatureError);
        }
        Ok(Header {
            major_version: to_u16(&data[26..28]),
            sector_shift: to_u16(&data[30..32]),
            file_allocation_table_count: to_usize(&data[44..48]),
            directory_start: to_usize(&data[48..52]),
            mini_file_allocation_table_start: to_usize(&data[60..64]),
            mini_file_allocation_table_count: to_usize(&data[64..68]),
            double_indirect_start: to_usize(&data[68..72]),
            double_indirect_count: to_usize(&data[72..76]),
        })
    }

    fn sector_size(&self) -> Result<usize, CfbError> {
        match (self.major_version, self.sector_shift) {
            (3, 9) => Ok(512),
            (4, 12) => Ok(4096),
            (version, shift) => Err(CfbError::SectorSizeError(version, shift)),
        }
    }
}

struct Directory {
    start: usize,
    size: usize,
}

impl Directory {
    fn new(bytes: &[u8], major_version: u16) -> (String, Directory) {
        let length = (to_u16(&bytes[64..66]) as usize).min(64);
        let (name, _) = UTF_16LE.decode_without_bom_handling(&bytes[..length]);
        let name = name.split('\0').next().unwrap_or_default().to_owned();
        let start = to_usize(&bytes[116..120]);
        // Version 3 files may leave garbage in the high half of the size
        let size = if major_version == 3 {
            to_u32(&bytes[120..124]) as usize
        } else {
            to_u64(&bytes[120..128]) as usize
        };
        (name, Directory { start, size })
    }
}
