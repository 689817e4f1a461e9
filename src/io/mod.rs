mod block;

pub use block::{BlockError, VirtualDisk, BLOCK_COUNT, BLOCK_LEN, DISK_BYTES};
