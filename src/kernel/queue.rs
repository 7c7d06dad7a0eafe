// Fixed-size FIFO ring buffer
// NOTE: No dynamic allocation; capacity is the const parameter

pub struct RingQueue<T: Copy, const N: usize> {
    buf: [Option<T>; N],
    head: usize, // next to read
    tail: usize, // next to write
    len: usize,
}

impl<T: Copy, const N: usize> RingQueue<T, N> {
    pub const fn new() -> Self {
        Self {
            buf: [None; N],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.len >= N {
            return Err(item);
        }
        self.buf[self.tail] = Some(item);
        self.tail = (self.tail + 1) % N;
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.buf[self.head].take();
        self.head = (self.head + 1) % N;
        self.len -= 1;
        item
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        let (head, len) = (self.head, self.len);
        self.buf
            .iter_mut()
            .enumerate()
            .filter(move |(i, _)| (i + N - head) % N < len)
            .filter_map(|(_, slot)| slot.as_mut())
    }

    pub fn find_mut(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<&mut T> {
        self.iter_mut().find(|item| pred(item))
    }

    /// Keep only the items `keep` accepts, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        for _ in 0..self.len {
            if let Some(item) = self.pop() {
                if keep(&item) {
                    // cannot fail: one slot was just freed
                    let _ = self.push(item);
                }
            }
        }
    }
}

impl<T: Copy, const N: usize> Default for RingQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
