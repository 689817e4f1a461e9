use thiserror::Error;

/// Bytes in one block.
pub const BLOCK_LEN: usize = 64;
/// Blocks on the virtual disk.
pub const BLOCK_COUNT: usize = 64;
/// Size of the flat persisted image.
pub const DISK_BYTES: usize = BLOCK_LEN * BLOCK_COUNT;

/// Failures raised at the block-store boundary. The engine catches these
/// and reports them as operation-level failures; nothing above this layer
/// produces them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("block {0} is out of range")]
    OutOfRange(usize),
    #[error("a {0} byte write does not fit in one block")]
    Oversize(usize),
}

/// The virtual disk: a fixed array of equal-size blocks with bounds-checked
/// raw access. There is no caching layer; every call touches the backing
/// array directly.
pub struct VirtualDisk {
    blocks: [[u8; BLOCK_LEN]; BLOCK_COUNT],
}

impl VirtualDisk {
    /// A zeroed disk, the starting point for both formatting and loading.
    pub fn new() -> Self {
        Self {
            blocks: [[0; BLOCK_LEN]; BLOCK_COUNT],
        }
    }

    /// Copies block `index` out of the store.
    pub fn read_block(&self, index: usize) -> Result<[u8; BLOCK_LEN], BlockError> {
        if index >= BLOCK_COUNT {
            return Err(BlockError::OutOfRange(index));
        }
        Ok(self.blocks[index])
    }

    /// Overwrites the front of block `index` with `bytes`. Shorter writes
    /// leave the tail of the block as it was.
    pub fn write_block(&mut self, index: usize, bytes: &[u8]) -> Result<(), BlockError> {
        if index >= BLOCK_COUNT {
            return Err(BlockError::OutOfRange(index));
        }
        if bytes.len() > BLOCK_LEN {
            return Err(BlockError::Oversize(bytes.len()));
        }
        self.blocks[index][..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Loads a full flat image, block by block. The caller validates the
    /// image length beforehand.
    pub fn load_image(&mut self, image: &[u8]) {
        debug_assert_eq!(image.len(), DISK_BYTES);
        for (block, chunk) in self.blocks.iter_mut().zip(image.chunks_exact(BLOCK_LEN)) {
            block.copy_from_slice(chunk);
        }
    }

    /// Serializes every block into one flat image for persistence.
    pub fn to_image(&self) -> Vec<u8> {
        let mut image = Vec::with_capacity(DISK_BYTES);
        for block in &self.blocks {
            image.extend_from_slice(block);
        }
        image
    }
}

impl Default for VirtualDisk {
    fn default() -> Self {
        Self::new()
    }
}
