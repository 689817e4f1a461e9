/// One open-file-table row: the buffered window of a single open file plus
/// its cursor. The row knows nothing about the disk layout: the buffer
/// length is whatever the owner hands it, and block numbers are opaque.
///
/// The window invariant is the owner's job: before reading or writing
/// through the row, the loaded buffer must be the block containing
/// `position` (or, when `position` sits exactly on a block boundary, the
/// block the cursor is about to enter).
pub struct OftEntry {
    buffer: Vec<u8>,
    position: usize,
    length: usize,
    descriptor: Option<usize>,
    block: Option<usize>,
}

impl OftEntry {
    pub fn new(buffer_len: usize) -> Self {
        Self {
            buffer: vec![0; buffer_len],
            position: 0,
            length: 0,
            descriptor: None,
            block: None,
        }
    }

    /// Resets the row to its initial free state.
    pub fn free(&mut self) {
        self.buffer.fill(0);
        self.position = 0;
        self.length = 0;
        self.descriptor = None;
        self.block = None;
    }

    pub fn is_free(&self) -> bool {
        self.descriptor.is_none()
    }

    /// Binds the row to a descriptor. Length and window load lazily on
    /// first use.
    pub fn bind(&mut self, descriptor: usize) {
        self.descriptor = Some(descriptor);
    }

    pub fn descriptor(&self) -> Option<usize> {
        self.descriptor
    }

    pub fn block(&self) -> Option<usize> {
        self.block
    }

    pub fn has_no_block(&self) -> bool {
        self.block.is_none()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn set_length(&mut self, length: usize) {
        self.length = length;
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// The cursor has consumed the whole loaded block and the window must
    /// advance before the next byte moves.
    pub fn is_full(&self) -> bool {
        self.position > 0 && self.position % self.buffer.len() == 0
    }

    pub fn is_file_ended(&self) -> bool {
        self.position >= self.length
    }

    /// Points the window at `block`, replacing the buffered bytes.
    pub fn load_block(&mut self, block: usize, data: &[u8]) {
        self.buffer.copy_from_slice(data);
        self.block = Some(block);
    }

    /// Copies `bytes[start..]` into the window, stopping at the end of the
    /// loaded block. Advances the cursor, growing the file length when the
    /// write extends past it, and returns how many bytes were *not*
    /// consumed; the caller flushes, advances the window and calls again
    /// until that count reaches zero.
    pub fn update_buffer(&mut self, bytes: &[u8], start: usize) -> usize {
        let offset = self.position % self.buffer.len();
        let pending = bytes.len() - start;
        let space = self.buffer.len() - offset;
        let take = pending.min(space);
        self.buffer[offset..offset + take].copy_from_slice(&bytes[start..start + take]);
        self.position += take;
        if self.position > self.length {
            self.length = self.position;
        }
        pending - take
    }

    /// Read-side counterpart of [`update_buffer`](Self::update_buffer):
    /// hands out up to `count` buffered bytes, bounded by both the end of
    /// the loaded block and the file length, advancing the cursor. `None`
    /// when `count` would read past the end of the file.
    pub fn buffer_partition(&mut self, count: usize) -> Option<&[u8]> {
        if self.position + count > self.length {
            return None;
        }
        let offset = self.position % self.buffer.len();
        let in_block = self.buffer.len() - offset;
        let in_file = self.length - self.position;
        let take = count.min(in_block).min(in_file);
        self.position += take;
        Some(&self.buffer[offset..offset + take])
    }
}
