use std::collections::VecDeque;

/// A growable, single-producer single-consumer byte queue.
///
/// `write` appends to the back, `read`/`peek` consume or inspect from the
/// front. Bytes always come back out in the order they went in, regardless
/// of how the writes or reads were chunked.
#[derive(Debug, Default, Clone)]
pub struct ByteBuffer {
    inner: VecDeque<u8>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self {
            inner: VecDeque::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends `bytes` to the back of the queue.
    pub fn write(&mut self, bytes: &[u8]) {
        self.inner.extend(bytes);
    }

    /// Consumes up to `n` bytes from the front, returning them in FIFO
    /// order. Returns fewer than `n` bytes if that's all that's buffered.
    pub fn read(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.inner.len());
        self.inner.drain(..n).collect()
    }

    /// Non-destructively returns up to `n` bytes from the front.
    pub fn peek(&self, n: usize) -> Vec<u8> {
        self.inner.iter().take(n).copied().collect()
    }

    /// Drains the entire buffer.
    pub fn read_all(&mut self) -> Vec<u8> {
        self.inner.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_preserves_order_across_chunk_boundaries() {
        let mut buf = ByteBuffer::new();
        buf.write(b"hel");
        buf.write(b"lo, ");
        buf.write(b"world");

        assert_eq!(buf.len(), 12);
        assert_eq!(buf.read(5), b"hello");
        assert_eq!(buf.read(100), b", world");
        assert!(buf.empty());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut buf = ByteBuffer::new();
        buf.write(b"abcdef");
        assert_eq!(buf.peek(3), b"abc");
        assert_eq!(buf.len(), 6);
        assert_eq!(buf.read(3), b"abc");
        assert_eq!(buf.peek(3), b"def");
    }

    #[test]
    fn read_more_than_available_returns_what_is_there() {
        let mut buf = ByteBuffer::new();
        buf.write(b"ab");
        assert_eq!(buf.read(10), b"ab");
        assert!(buf.empty());
        assert_eq!(buf.read(10), Vec::<u8>::new());
    }
}
