//! Growable byte buffer with a fixed-length head reservation.
//!
//! Callers that know, before any row data is appended, exactly how many
//! predictable bytes a row will contribute (line terminator, field
//! separators, optional enclosure characters) reserve that length up front
//! with [`Buffer::set_fixed_length`]. Writing those predictable bytes with
//! [`Buffer::append_fixed`] never triggers a capacity check; everything else
//! goes through [`Buffer::append`]/[`Buffer::will_write`], which grow the
//! buffer by doubling when needed.

/// Initial buffer capacity.
const INITIAL_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    fixed_remaining: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(INITIAL_CAPACITY),
            fixed_remaining: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Reset the buffer for reuse, keeping its allocated capacity.
    pub fn clear(&mut self) {
        self.data.clear();
        self.fixed_remaining = 0;
    }

    /// Declare how many predictable bytes the head of the next row will
    /// consume. Must be called before any `append_fixed` calls for that row.
    pub fn set_fixed_length(&mut self, fixed_length: usize) {
        self.fixed_remaining = fixed_length;
        self.reserve(fixed_length);
    }

    /// Append one byte that was accounted for by `set_fixed_length`.
    #[inline]
    pub fn append_fixed(&mut self, byte: u8) {
        debug_assert!(
            self.fixed_remaining >= 1,
            "append_fixed called with no remaining fixed-length budget"
        );
        self.data.push(byte);
        self.fixed_remaining -= 1;
    }

    /// Ensure at least `bytes` more bytes can be appended without the
    /// growable region needing to reallocate mid-row.
    pub fn will_write(&mut self, bytes: usize) {
        self.reserve(bytes);
    }

    /// Append a single byte to the growable region.
    #[inline]
    pub fn append(&mut self, byte: u8) {
        self.data.push(byte);
    }

    /// Append a byte slice to the growable region.
    #[inline]
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    fn reserve(&mut self, additional: usize) {
        let required = self.data.len() + additional;
        if required > self.data.capacity() {
            // Exponential doubling: amortized O(1) growth.
            let mut new_capacity = self.data.capacity().max(INITIAL_CAPACITY);
            while new_capacity < required {
                new_capacity *= 2;
            }
            self.data.reserve(new_capacity - self.data.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_region_does_not_grow_mid_row() {
        let mut buf = Buffer::new();
        buf.set_fixed_length(3);
        buf.append_fixed(b'a');
        buf.append_fixed(b'b');
        buf.append_fixed(b'c');
        assert_eq!(buf.as_slice(), b"abc");
    }

    #[test]
    fn growable_region_grows_past_initial_capacity() {
        let mut buf = Buffer::new();
        let chunk = vec![b'x'; INITIAL_CAPACITY * 3];
        buf.will_write(chunk.len());
        buf.append_bytes(&chunk);
        assert_eq!(buf.len(), chunk.len());
    }

    #[test]
    fn clear_resets_length_and_fixed_budget() {
        let mut buf = Buffer::new();
        buf.set_fixed_length(1);
        buf.append_fixed(b'z');
        buf.clear();
        assert_eq!(buf.len(), 0);
        buf.set_fixed_length(1);
        buf.append_fixed(b'y');
        assert_eq!(buf.as_slice(), b"y");
    }
}
