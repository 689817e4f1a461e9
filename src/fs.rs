use std::collections::HashMap;

use log::{debug, info};
use thiserror::Error;

use crate::alloc::{self, Bitmap, BITMAP_BLOCK};
use crate::codec::{pack_int, unpack_int, BYTES_PER_INT};
use crate::desc::{
    descriptor_location, Descriptor, DATA_BLOCK_START, DESCRIPTOR_COUNT, DESCRIPTOR_START_BLOCK,
    MAX_BLOCKS_PER_FILE, NULL_BLOCK, ROOT_DESCRIPTOR,
};
use crate::io::{BlockError, VirtualDisk, BLOCK_LEN, DISK_BYTES};
use crate::oft::OftEntry;

/// Open-file-table size; slot 0 is the mounted-volume session.
pub const OFT_SIZE: usize = 4;
/// Longest accepted file name, in bytes.
pub const MAX_FILENAME_LEN: usize = 4;
/// A file never outgrows its descriptor's three block pointers.
pub const MAX_FILE_LEN: usize = MAX_BLOCKS_PER_FILE * BLOCK_LEN;
/// Descriptor 0 belongs to the directory, leaving the rest for user files.
pub const MAX_FILE_COUNT: usize = DESCRIPTOR_COUNT - 1;

/// One directory record: four name bytes plus a packed descriptor index.
const DIR_ENTRY_LEN: usize = MAX_FILENAME_LEN + BYTES_PER_INT;
/// Fills erased directory records and pads short names.
const ERASED: u8 = 0xFF;

const ROOT_SLOT: usize = 0;

/// Failure taxonomy for engine operations. The block store is the only
/// layer below with its own error type; it converts on the way out.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("invalid argument: {0}")]
    Validation(&'static str),
    #[error("out of capacity: {0}")]
    Capacity(&'static str),
    #[error("invalid state: {0}")]
    State(&'static str),
    #[error(transparent)]
    Boundary(#[from] BlockError),
    #[error("host image i/o: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// A single-volume file system simulated on a virtual block device and
/// persisted as one flat host file.
///
/// The engine is an ordinary owned value; `init` mounts a volume (fresh or
/// from a saved image) and `save` persists and unmounts it. While mounted,
/// open-file-table slot 0 carries the directory session and slots 1..3
/// serve user files. The directory itself is an ordinary file (descriptor
/// 0) driven through the same buffered machinery as everything else.
pub struct FileSystem {
    disk: VirtualDisk,
    oft: Vec<OftEntry>,
    names: Vec<String>,
    index_of: HashMap<String, usize>,
}

impl FileSystem {
    pub fn new() -> Self {
        Self {
            disk: VirtualDisk::new(),
            oft: (0..OFT_SIZE).map(|_| OftEntry::new(BLOCK_LEN)).collect(),
            names: Vec::new(),
            index_of: HashMap::new(),
        }
    }

    pub fn is_mounted(&self) -> bool {
        !self.oft[ROOT_SLOT].is_free()
    }

    /// Mounts a volume: a freshly formatted one when `path` is empty,
    /// otherwise the image stored at `path`. Rebuilds the directory cache
    /// by replaying descriptor 0's content through the normal read path;
    /// on a fresh volume that first read materializes the directory's
    /// first data block.
    pub fn init(&mut self, path: &str) -> Result<()> {
        if self.is_mounted() {
            return Err(FsError::State("a volume is already mounted"));
        }
        if path.is_empty() {
            self.format()?;
        } else {
            let image = std::fs::read(path)?;
            if image.len() != DISK_BYTES {
                return Err(FsError::Validation("image is not one full disk"));
            }
            self.disk.load_image(&image);
        }
        self.oft[ROOT_SLOT].bind(ROOT_DESCRIPTOR);
        if let Err(error) = self.load_directory() {
            self.oft[ROOT_SLOT].free();
            self.names.clear();
            self.index_of.clear();
            return Err(error);
        }
        info!("mounted volume with {} files", self.names.len());
        Ok(())
    }

    /// Flushes every open session, writes the flat image to `path`
    /// (creating the file if absent) and unmounts. A host I/O failure
    /// aborts with the volume still mounted.
    pub fn save(&mut self, path: &str) -> Result<()> {
        self.require_mounted()?;
        if path.is_empty() {
            return Err(FsError::Validation("empty image path"));
        }
        for slot in 0..OFT_SIZE {
            self.flush_slot(slot)?;
        }
        std::fs::write(path, self.disk.to_image())?;
        for entry in self.oft.iter_mut() {
            entry.free();
        }
        self.names.clear();
        self.index_of.clear();
        info!("saved volume image to {}", path);
        Ok(())
    }

    /// Creates an empty file: claims a free descriptor and records the
    /// name in the first erased directory slot, or at the end of the
    /// directory when none is erased.
    pub fn create(&mut self, name: &str) -> Result<()> {
        self.require_mounted()?;
        validate_name(name)?;
        if self.index_of.contains_key(name) {
            return Err(FsError::Validation("name already exists"));
        }
        if self.names.len() >= MAX_FILE_COUNT {
            return Err(FsError::Capacity("directory is full"));
        }
        let descriptor = self.claim_descriptor()?;
        let raw = self.directory_bytes()?;
        let offset = raw
            .chunks_exact(DIR_ENTRY_LEN)
            .position(|record| entry_name(record).is_none())
            .map(|slot| slot * DIR_ENTRY_LEN)
            .unwrap_or(raw.len());
        self.seek_slot(ROOT_SLOT, offset)?;
        self.write_slot_bytes(ROOT_SLOT, &encode_entry(name, descriptor))?;
        self.names.push(name.to_string());
        self.index_of.insert(name.to_string(), descriptor);
        debug!("created {} as descriptor {}", name, descriptor);
        Ok(())
    }

    /// Removes a file: erases its directory record, then returns its
    /// descriptor and data blocks to the free pools. Fails while any open
    /// session still references the descriptor.
    pub fn destroy(&mut self, name: &str) -> Result<()> {
        self.require_mounted()?;
        let descriptor = *self
            .index_of
            .get(name)
            .ok_or(FsError::Validation("no such file"))?;
        for slot in 1..OFT_SIZE {
            if self.oft[slot].descriptor() == Some(descriptor) {
                return Err(FsError::State("file is open"));
            }
        }
        let raw = self.directory_bytes()?;
        let offset = raw
            .chunks_exact(DIR_ENTRY_LEN)
            .position(|record| entry_name(record) == Some(name.as_bytes()))
            .map(|slot| slot * DIR_ENTRY_LEN)
            .ok_or(FsError::Validation("no such file"))?;
        self.seek_slot(ROOT_SLOT, offset)?;
        self.write_slot_bytes(ROOT_SLOT, &[ERASED; DIR_ENTRY_LEN])?;
        self.release_descriptor(descriptor)?;
        self.names.retain(|existing| existing != name);
        self.index_of.remove(name);
        debug!("destroyed {} (descriptor {})", name, descriptor);
        Ok(())
    }

    /// Opens a file and returns its open-file-table slot. The buffer
    /// window and cached length load lazily on first read, write or seek.
    pub fn open(&mut self, name: &str) -> Result<usize> {
        self.require_mounted()?;
        let descriptor = *self
            .index_of
            .get(name)
            .ok_or(FsError::Validation("no such file"))?;
        for slot in 1..OFT_SIZE {
            if self.oft[slot].descriptor() == Some(descriptor) {
                return Err(FsError::State("file is already open"));
            }
        }
        for slot in 1..OFT_SIZE {
            if self.oft[slot].is_free() {
                self.oft[slot].bind(descriptor);
                return Ok(slot);
            }
        }
        Err(FsError::Capacity("open file table is full"))
    }

    /// Flushes the buffered page and the recorded length, then frees the
    /// slot.
    pub fn close(&mut self, slot: usize) -> Result<()> {
        self.require_mounted()?;
        self.validate_slot(slot)?;
        self.flush_slot(slot)?;
        self.oft[slot].free();
        Ok(())
    }

    /// Reads `count` bytes from the slot's cursor, driving the buffer
    /// window across block boundaries as needed.
    pub fn read(&mut self, slot: usize, count: usize) -> Result<String> {
        self.require_mounted()?;
        self.validate_slot(slot)?;
        self.prepare_window(slot)?;
        if self.oft[slot].position() + count > self.oft[slot].length() {
            return Err(FsError::Validation("read past end of file"));
        }
        let content = self.read_slot_bytes(slot, count)?;
        String::from_utf8(content).map_err(|_| FsError::Validation("file holds non-text bytes"))
    }

    /// Writes `count` repetitions of the single-character `value` at the
    /// slot's cursor, allocating data blocks lazily as the window crosses
    /// into never-written territory.
    pub fn write(&mut self, slot: usize, value: &str, count: usize) -> Result<()> {
        self.require_mounted()?;
        self.validate_slot(slot)?;
        let byte = match value.as_bytes() {
            [byte] => *byte,
            _ => return Err(FsError::Validation("write value must be one character")),
        };
        if self.oft[slot].position() + count > MAX_FILE_LEN {
            return Err(FsError::Capacity("file would outgrow three blocks"));
        }
        self.write_slot_bytes(slot, &vec![byte; count])
    }

    /// Moves the slot's cursor to `position` and loads the block holding
    /// it. A failed move leaves the previous position observable.
    pub fn lseek(&mut self, slot: usize, position: usize) -> Result<()> {
        self.require_mounted()?;
        self.validate_slot(slot)?;
        self.seek_slot(slot, position)
    }

    /// The cached directory listing, in creation/replay order.
    pub fn directory(&self) -> Result<Vec<String>> {
        self.require_mounted()?;
        Ok(self.names.clone())
    }

    fn require_mounted(&self) -> Result<()> {
        if self.is_mounted() {
            Ok(())
        } else {
            Err(FsError::State("no volume is mounted"))
        }
    }

    fn validate_slot(&self, slot: usize) -> Result<()> {
        if slot == ROOT_SLOT || slot >= OFT_SIZE {
            return Err(FsError::Validation("invalid open file table slot"));
        }
        if self.oft[slot].is_free() {
            return Err(FsError::State("slot is not open"));
        }
        Ok(())
    }

    /// Lays down a fresh volume: zeroed disk, bitmap bits for the
    /// metadata region permanently set, every descriptor word holding the
    /// free sentinel.
    fn format(&mut self) -> Result<()> {
        self.disk = VirtualDisk::new();
        let mut block = [0u8; BLOCK_LEN];
        let mut bitmap = Bitmap::new();
        for index in 0..DATA_BLOCK_START {
            bitmap.set(index);
        }
        bitmap.store(&mut block);
        self.disk.write_block(BITMAP_BLOCK, &block)?;

        let mut region = [0u8; BLOCK_LEN];
        for offset in (0..BLOCK_LEN).step_by(BYTES_PER_INT) {
            pack_int(&mut region, offset, NULL_BLOCK);
        }
        for index in DESCRIPTOR_START_BLOCK..DATA_BLOCK_START {
            self.disk.write_block(index, &region)?;
        }
        Ok(())
    }

    /// Rebuilds the in-memory name list and name→descriptor map from the
    /// directory file, skipping erased records.
    fn load_directory(&mut self) -> Result<()> {
        let raw = self.directory_bytes()?;
        for record in raw.chunks_exact(DIR_ENTRY_LEN) {
            let name = match entry_name(record) {
                Some(bytes) => bytes,
                None => continue,
            };
            let name = std::str::from_utf8(name)
                .map_err(|_| FsError::Validation("invalid directory entry"))?
                .to_string();
            let descriptor = unpack_int(record, MAX_FILENAME_LEN) as usize;
            self.names.push(name.clone());
            self.index_of.insert(name, descriptor);
        }
        Ok(())
    }

    /// The directory file's full content, read through the slot 0 session.
    fn directory_bytes(&mut self) -> Result<Vec<u8>> {
        self.seek_slot(ROOT_SLOT, 0)?;
        let length = self.oft[ROOT_SLOT].length();
        self.read_slot_bytes(ROOT_SLOT, length)
    }

    /// Collects `count` bytes starting at the slot's cursor. The window
    /// must already cover the cursor and the caller has checked `count`
    /// against the file length.
    fn read_slot_bytes(&mut self, slot: usize, count: usize) -> Result<Vec<u8>> {
        let mut content = Vec::with_capacity(count);
        let mut remaining = count;
        while remaining > 0 {
            let taken = {
                let part = self.oft[slot]
                    .buffer_partition(remaining)
                    .ok_or(FsError::Validation("read past end of file"))?;
                content.extend_from_slice(part);
                part.len()
            };
            remaining -= taken;
            if remaining > 0 {
                self.prepare_window(slot)?;
            }
        }
        Ok(content)
    }

    /// Pushes `bytes` through the slot's window, flushing and advancing at
    /// each block boundary until everything is consumed.
    fn write_slot_bytes(&mut self, slot: usize, bytes: &[u8]) -> Result<()> {
        self.prepare_window(slot)?;
        let mut start = 0;
        loop {
            let rest = self.oft[slot].update_buffer(bytes, start);
            if rest == 0 {
                return Ok(());
            }
            self.prepare_window(slot)?;
            start = bytes.len() - rest;
        }
    }

    /// Makes the slot's window usable: loads it on first touch, flushes
    /// and advances it once the cursor has consumed the loaded block.
    fn prepare_window(&mut self, slot: usize) -> Result<()> {
        if self.oft[slot].has_no_block() {
            let descriptor = self.session_descriptor(slot)?;
            let length = self.recorded_length(descriptor)?;
            self.oft[slot].set_length(length);
            self.load_window(slot)
        } else if self.oft[slot].is_full() {
            self.flush_slot(slot)?;
            self.load_window(slot)
        } else {
            Ok(())
        }
    }

    /// Flushes the window, moves the cursor and loads the block containing
    /// the new position; restores the old position if that block cannot be
    /// resolved.
    fn seek_slot(&mut self, slot: usize, position: usize) -> Result<()> {
        if self.oft[slot].has_no_block() {
            let descriptor = self.session_descriptor(slot)?;
            let length = self.recorded_length(descriptor)?;
            self.oft[slot].set_length(length);
        }
        if position > self.oft[slot].length() {
            return Err(FsError::Validation("seek past end of file"));
        }
        self.flush_slot(slot)?;
        let previous = self.oft[slot].position();
        self.oft[slot].set_position(position);
        if let Err(error) = self.load_window(slot) {
            self.oft[slot].set_position(previous);
            return Err(error);
        }
        Ok(())
    }

    /// Points the slot's window at the block containing its cursor.
    fn load_window(&mut self, slot: usize) -> Result<()> {
        let descriptor = self.session_descriptor(slot)?;
        let ordinal = self.oft[slot].position() / BLOCK_LEN;
        let block = self.resolve_block(descriptor, ordinal)?;
        let data = self.disk.read_block(block)?;
        self.oft[slot].load_block(block, &data);
        Ok(())
    }

    /// Writes the slot's buffered page and recorded length back to disk.
    /// A free or never-loaded slot has nothing to flush.
    fn flush_slot(&mut self, slot: usize) -> Result<()> {
        let (descriptor, block) = match (self.oft[slot].descriptor(), self.oft[slot].block()) {
            (Some(descriptor), Some(block)) => (descriptor, block),
            _ => return Ok(()),
        };
        let length = self.oft[slot].length();
        self.set_recorded_length(descriptor, length)?;
        self.disk.write_block(block, self.oft[slot].buffer())?;
        Ok(())
    }

    fn session_descriptor(&self, slot: usize) -> Result<usize> {
        self.oft[slot]
            .descriptor()
            .ok_or(FsError::State("slot is not open"))
    }

    /// Resolves the data block backing the file's `ordinal`-th block,
    /// allocating one on first touch. Reads and seeks funnel through here
    /// as well as writes, so touching a never-written region materializes
    /// its block.
    fn resolve_block(&mut self, descriptor: usize, ordinal: usize) -> Result<usize> {
        if ordinal >= MAX_BLOCKS_PER_FILE {
            return Err(FsError::Capacity("file already spans three blocks"));
        }
        let mut record = self.read_descriptor(descriptor)?;
        if record.blocks[ordinal] != NULL_BLOCK {
            return Ok(record.blocks[ordinal] as usize);
        }
        let block = alloc::allocate_block(&mut self.disk)?;
        record.blocks[ordinal] = block as u32;
        self.write_descriptor(descriptor, &record)?;
        Ok(block)
    }

    /// Linear scan for the first free descriptor past the directory's;
    /// claims it by resetting the recorded length to zero.
    fn claim_descriptor(&mut self) -> Result<usize> {
        for index in 1..DESCRIPTOR_COUNT {
            let mut record = self.read_descriptor(index)?;
            if record.is_free() {
                record.length = 0;
                self.write_descriptor(index, &record)?;
                return Ok(index);
            }
        }
        Err(FsError::Capacity("no free descriptor"))
    }

    /// Returns the descriptor's data blocks to the bitmap and resets the
    /// record to the free sentinel.
    fn release_descriptor(&mut self, index: usize) -> Result<()> {
        let mut record = self.read_descriptor(index)?;
        for pointer in record.blocks.iter_mut() {
            if *pointer != NULL_BLOCK {
                alloc::free_block(&mut self.disk, *pointer as usize)?;
                *pointer = NULL_BLOCK;
            }
        }
        record.length = NULL_BLOCK;
        self.write_descriptor(index, &record)
    }

    /// The file length recorded on disk, normalizing the stale artifact of
    /// a just-claimed descriptor (`length == 1` with no first block) back
    /// to zero, on disk, before reporting it.
    fn recorded_length(&mut self, index: usize) -> Result<usize> {
        let mut record = self.read_descriptor(index)?;
        if record.length == NULL_BLOCK && record.blocks[0] == NULL_BLOCK {
            record.length = 0;
            self.write_descriptor(index, &record)?;
        }
        Ok(record.length as usize)
    }

    fn set_recorded_length(&mut self, index: usize, length: usize) -> Result<()> {
        let mut record = self.read_descriptor(index)?;
        record.length = length as u32;
        self.write_descriptor(index, &record)
    }

    fn read_descriptor(&self, index: usize) -> Result<Descriptor> {
        let (block, offset) = descriptor_location(index);
        let data = self.disk.read_block(block)?;
        Ok(Descriptor::parse(&data, offset))
    }

    fn write_descriptor(&mut self, index: usize, record: &Descriptor) -> Result<()> {
        let (block, offset) = descriptor_location(index);
        let mut data = self.disk.read_block(block)?;
        record.store(&mut data, offset);
        self.disk.write_block(block, &data)?;
        Ok(())
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FsError::Validation("empty file name"));
    }
    if name.len() > MAX_FILENAME_LEN || !name.is_ascii() {
        return Err(FsError::Validation("file names are at most four ascii bytes"));
    }
    Ok(())
}

fn encode_entry(name: &str, descriptor: usize) -> [u8; DIR_ENTRY_LEN] {
    let mut entry = [ERASED; DIR_ENTRY_LEN];
    entry[..name.len()].copy_from_slice(name.as_bytes());
    pack_int(&mut entry, MAX_FILENAME_LEN, descriptor as u32);
    entry
}

/// The name bytes of a directory record with the `0xFF` padding stripped;
/// `None` for an erased record.
fn entry_name(record: &[u8]) -> Option<&[u8]> {
    let name = &record[..MAX_FILENAME_LEN];
    let end = name.iter().rposition(|&byte| byte != ERASED)? + 1;
    Some(&name[..end])
}
