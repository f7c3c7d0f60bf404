//! Payload masking

/// Generate a fresh random masking key.
#[inline]
pub fn generate() -> [u8; 4] {
    rand::random()
}

/// XOR the masking keystream over `buf`, starting at keystream position zero.
///
/// Masking is an involution: applying the same key twice restores the input.
#[inline]
pub fn apply_mask(buf: &mut [u8], mask: [u8; 4]) {
    apply_mask_at(buf, mask, 0)
}

/// XOR the masking keystream over `buf`, where `buf[0]` sits at `offset`
/// bytes into the frame payload.
pub fn apply_mask_at(buf: &mut [u8], mask: [u8; 4], offset: usize) {
    let key = rotate(mask, offset);
    let word = u32::from_ne_bytes(key);

    let mut chunks = buf.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(chunk);
        chunk.copy_from_slice(&(u32::from_ne_bytes(bytes) ^ word).to_ne_bytes());
    }

    for (byte, k) in chunks.into_remainder().iter_mut().zip(key) {
        *byte ^= k;
    }
}

#[inline]
fn rotate(mask: [u8; 4], offset: usize) -> [u8; 4] {
    let n = offset & 3;
    [mask[n], mask[(n + 1) & 3], mask[(n + 2) & 3], mask[(n + 3) & 3]]
}

/// Running keystream for a payload that is unmasked in pieces as it arrives.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Masker {
    key: Option<[u8; 4]>,
    offset: usize,
}

impl Masker {
    pub(crate) fn new(key: Option<[u8; 4]>) -> Self {
        Masker { key, offset: 0 }
    }

    /// Unmask the next `buf.len()` payload bytes.
    pub(crate) fn apply(&mut self, buf: &mut [u8]) {
        if let Some(key) = self.key {
            apply_mask_at(buf, key, self.offset);
            self.offset = (self.offset + buf.len()) & 3;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(buf: &mut [u8], mask: [u8; 4]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte ^= mask[i & 3];
        }
    }

    #[test]
    fn matches_bytewise_masking() {
        let mask = [0x6d, 0xb6, 0xb2, 0x80];
        for len in 0..40 {
            let data: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(31)).collect();
            let mut fast = data.clone();
            let mut slow = data.clone();
            apply_mask(&mut fast, mask);
            reference(&mut slow, mask);
            assert_eq!(fast, slow, "len {len}");

            apply_mask(&mut fast, mask);
            assert_eq!(fast, data);
        }
    }

    #[test]
    fn split_unmasking_keeps_keystream_position() {
        let mask = [1, 2, 3, 4];
        let data = b"The quick brown fox jumps over".to_vec();
        let mut whole = data.clone();
        apply_mask(&mut whole, mask);

        let mut pieces = data.clone();
        let mut masker = Masker::new(Some(mask));
        let (a, rest) = pieces.split_at_mut(3);
        let (b, c) = rest.split_at_mut(6);
        masker.apply(a);
        masker.apply(b);
        masker.apply(c);
        assert_eq!(pieces, whole);
    }
}
