//! Byte buffers used by the engine and by callers reading messages.
//!
//! The `FlatBuffer` is a buffer of bytes similar to a first-in, first-out queue.
//! It is filled from the transport at its tail and drained from its head as
//! frames are parsed.

use bytes::BytesMut;

use crate::error::{CapacityError, Result};

/// Growable destination for message payloads.
pub trait DynamicBuffer {
    /// Number of readable bytes held.
    fn size(&self) -> usize;

    /// Upper bound for [`size`](Self::size).
    fn max_size(&self) -> usize {
        usize::MAX
    }

    /// Append bytes at the tail.
    fn extend(&mut self, bytes: &[u8]) -> Result<()>;

    /// Space left before [`max_size`](Self::max_size) is reached.
    fn remaining(&self) -> usize {
        self.max_size().saturating_sub(self.size())
    }
}

fn check_capacity(size: usize, add: usize, max: usize) -> Result<()> {
    match size.checked_add(add) {
        Some(total) if total <= max => Ok(()),
        _ => Err(CapacityError::BufferOverflow { size: size.saturating_add(add), max }.into()),
    }
}

impl DynamicBuffer for Vec<u8> {
    fn size(&self) -> usize {
        self.len()
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

impl DynamicBuffer for BytesMut {
    fn size(&self) -> usize {
        self.len()
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// A FIFO byte buffer with a hard capacity.
#[derive(Debug)]
pub struct FlatBuffer {
    storage: Vec<u8>,
    head: usize,
    max: usize,
}

impl FlatBuffer {
    /// Initializes an empty buffer that never holds more than `max` bytes
    pub fn with_max_size(max: usize) -> Self {
        Self { storage: Vec::new(), head: 0, max }
    }

    /// Readable bytes.
    pub fn data(&self) -> &[u8] {
        &self.storage[self.head..]
    }

    /// Readable bytes, mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.head..]
    }

    /// Number of readable bytes.
    pub fn len(&self) -> usize {
        self.storage.len() - self.head
    }

    /// Whether there is nothing to read.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop `n` bytes from the head.
    pub fn consume(&mut self, n: usize) {
        self.head = (self.head + n).min(self.storage.len());
        if self.head == self.storage.len() {
            self.storage.clear();
            self.head = 0;
        }
    }

    /// Writable region of up to `n` bytes at the tail, clamped to the remaining capacity.
    ///
    /// Bytes written into the region become readable after [`commit`](Self::commit).
    pub fn prepare(&mut self, n: usize) -> Result<&mut [u8]> {
        self.clean();
        let len = self.storage.len();
        let n = n.min(self.max - len.min(self.max));
        if n == 0 {
            return Err(CapacityError::BufferOverflow { size: len + 1, max: self.max }.into());
        }
        self.storage.resize(len + n, 0);
        Ok(&mut self.storage[len..])
    }

    /// Keep `n` bytes of the last prepared region and discard the rest.
    pub fn commit(&mut self, prepared: usize, n: usize) {
        let len = self.storage.len();
        self.storage.truncate(len - prepared + n.min(prepared));
    }

    /// Remove all readable bytes and hand them out.
    pub fn take(&mut self) -> Vec<u8> {
        let out = self.data().to_vec();
        self.storage.clear();
        self.head = 0;
        out
    }

    /// Cleans up the part of the storage that was already consumed
    fn clean(&mut self) {
        if self.head > 0 {
            self.storage.drain(..self.head);
            self.head = 0;
        }
    }
}

impl DynamicBuffer for FlatBuffer {
    fn size(&self) -> usize {
        self.len()
    }

    fn max_size(&self) -> usize {
        self.max
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        check_capacity(self.len(), bytes.len(), self.max)?;
        self.clean();
        self.storage.extend_from_slice(bytes);
        Ok(())
    }
}
