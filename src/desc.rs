use crate::codec::{pack_int, unpack_int, BYTES_PER_INT};
use crate::io::BLOCK_LEN;

/// Words per on-disk descriptor: the recorded length plus three block
/// pointers.
pub const DESCRIPTOR_WORDS: usize = 4;
/// Bytes one descriptor occupies.
pub const DESCRIPTOR_BYTES: usize = DESCRIPTOR_WORDS * BYTES_PER_INT;
/// Descriptors packed into one block.
pub const DESCRIPTORS_PER_BLOCK: usize = BLOCK_LEN / DESCRIPTOR_BYTES;
/// Total descriptors on the volume; descriptor 0 is the root directory.
pub const DESCRIPTOR_COUNT: usize = 24;
/// The descriptor table starts right after the bitmap block.
pub const DESCRIPTOR_START_BLOCK: usize = 1;
/// First block of the data region, right after the descriptor table.
pub const DATA_BLOCK_START: usize =
    DESCRIPTOR_START_BLOCK + DESCRIPTOR_COUNT / DESCRIPTORS_PER_BLOCK;
/// A file never owns more blocks than its descriptor has pointers.
pub const MAX_BLOCKS_PER_FILE: usize = DESCRIPTOR_WORDS - 1;
/// Descriptor reserved for the root directory.
pub const ROOT_DESCRIPTOR: usize = 0;

/// `1` marks an unset block pointer and, paired with `length == 1`, a free
/// descriptor. The overload is sound only while real data block indices
/// stay strictly above it.
pub const NULL_BLOCK: u32 = 1;

const _: () = assert!(DATA_BLOCK_START > NULL_BLOCK as usize);

/// Maps a descriptor index to the block holding it and the byte offset of
/// its first word inside that block. Descriptors pack contiguously from
/// [`DESCRIPTOR_START_BLOCK`].
pub fn descriptor_location(index: usize) -> (usize, usize) {
    let block = DESCRIPTOR_START_BLOCK + index / DESCRIPTORS_PER_BLOCK;
    let offset = (index % DESCRIPTORS_PER_BLOCK) * DESCRIPTOR_BYTES;
    (block, offset)
}

/// One on-disk file descriptor: the recorded length and up to three data
/// block pointers, [`NULL_BLOCK`] where unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub length: u32,
    pub blocks: [u32; MAX_BLOCKS_PER_FILE],
}

impl Descriptor {
    pub fn parse(block: &[u8], offset: usize) -> Self {
        let length = unpack_int(block, offset);
        let mut blocks = [NULL_BLOCK; MAX_BLOCKS_PER_FILE];
        for (slot, pointer) in blocks.iter_mut().enumerate() {
            *pointer = unpack_int(block, offset + (slot + 1) * BYTES_PER_INT);
        }
        Self { length, blocks }
    }

    pub fn store(&self, block: &mut [u8], offset: usize) {
        pack_int(block, offset, self.length);
        for (slot, &pointer) in self.blocks.iter().enumerate() {
            pack_int(block, offset + (slot + 1) * BYTES_PER_INT, pointer);
        }
    }

    /// The free sentinel: `length == 1` together with an unset first
    /// pointer. A claimed-but-empty file has `length == 0` instead.
    pub fn is_free(&self) -> bool {
        self.length == NULL_BLOCK && self.blocks[0] == NULL_BLOCK
    }
}
