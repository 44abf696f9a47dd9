use crate::error::{ModemError, Result};
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Fixed-capacity byte buffer owned by exactly one holder at a time
#[derive(Debug)]
pub struct Buffer {
    id: usize,
    data: Vec<u8>,
    filled: usize,
}

impl Buffer {
    fn new(id: usize, capacity: usize) -> Self {
        Self {
            id,
            data: vec![0u8; capacity],
            filled: 0,
        }
    }

    /// Stable identity of the pool slot, unique within one pool
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn filled_len(&self) -> usize {
        self.filled
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Bytes written so far
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Append bytes after the fill cursor. Returns how many fit.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.remaining());
        self.data[self.filled..self.filled + n].copy_from_slice(&bytes[..n]);
        self.filled += n;
        n
    }

    /// Whole backing storage, for sources that read straight into the buffer
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Set the fill cursor after writing through [`Buffer::storage_mut`].
    pub fn set_filled_len(&mut self, len: usize) {
        self.filled = len.min(self.data.len());
    }

    fn clear(&mut self) {
        self.filled = 0;
    }
}

/// Item handed to the consumer side of the pool
///
/// End-of-stream is its own variant so it can never be confused with a data
/// buffer that happens to be empty.
#[derive(Debug)]
pub enum ReadyItem {
    Data(Buffer),
    EndOfStream,
}

struct PoolState {
    available: VecDeque<Buffer>,
    ready: VecDeque<ReadyItem>,
    closed: bool,
}

impl PoolState {
    fn ready_buffers(&self) -> usize {
        self.ready
            .iter()
            .filter(|item| matches!(item, ReadyItem::Data(_)))
            .count()
    }
}

/// Fixed set of buffers split between an "available" pool and a FIFO "ready" queue
///
/// One mutex guards both queues; `available_cv` wakes producers waiting for a
/// free buffer and `ready_cv` wakes consumers waiting for data. Every buffer is
/// at any moment either queued on one side or held by exactly one caller.
pub struct BufferPool {
    state: Mutex<PoolState>,
    available_cv: Condvar,
    ready_cv: Condvar,
    count: usize,
    capacity: usize,
}

impl BufferPool {
    pub fn new(count: usize, capacity: usize) -> Self {
        let available = (0..count).map(|id| Buffer::new(id, capacity)).collect();
        Self {
            state: Mutex::new(PoolState {
                available,
                ready: VecDeque::with_capacity(count + 1),
                closed: false,
            }),
            available_cv: Condvar::new(),
            ready_cv: Condvar::new(),
            count,
            capacity,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_len(&self) -> usize {
        self.state.lock().available.len()
    }

    /// Data buffers waiting for the consumer, not counting end-of-stream markers
    pub fn ready_len(&self) -> usize {
        self.state.lock().ready_buffers()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Block until a free buffer exists. `None` means the pool was closed.
    pub fn acquire_available(&self) -> Option<Buffer> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(buffer) = state.available.pop_front() {
                return Some(buffer);
            }
            self.available_cv.wait(&mut state);
        }
    }

    /// Block until the oldest ready item exists. `None` means the pool was closed.
    pub fn acquire_ready(&self) -> Option<ReadyItem> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.ready.pop_front() {
                return Some(item);
            }
            self.ready_cv.wait(&mut state);
        }
    }

    pub fn release_as_ready(&self, buffer: Buffer) {
        self.state.lock().ready.push_back(ReadyItem::Data(buffer));
        self.ready_cv.notify_one();
    }

    pub fn release_as_available(&self, mut buffer: Buffer) {
        buffer.clear();
        self.state.lock().available.push_back(buffer);
        self.available_cv.notify_one();
    }

    /// Queue the end-of-stream marker behind any pending data. It occupies no pool slot.
    pub fn push_end_of_stream(&self) {
        self.state.lock().ready.push_back(ReadyItem::EndOfStream);
        self.ready_cv.notify_one();
    }

    /// Wake every blocked caller; all acquires return `None` until [`BufferPool::reset`].
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            debug!("closing buffer pool");
            state.closed = true;
        }
        drop(state);
        self.available_cv.notify_all();
        self.ready_cv.notify_all();
    }

    /// Return every queued buffer to the available side and reopen the pool.
    ///
    /// Fails without touching anything if a buffer is still held by a caller.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock();
        let queued = state.available.len() + state.ready_buffers();
        if queued != self.count {
            let outstanding = self.count - queued;
            warn!("cannot reset pool, {} buffers still held", outstanding);
            return Err(ModemError::BuffersOutstanding(outstanding));
        }

        let ready: Vec<ReadyItem> = state.ready.drain(..).collect();
        for item in ready {
            if let ReadyItem::Data(mut buffer) = item {
                buffer.clear();
                state.available.push_back(buffer);
            }
        }
        state.closed = false;
        Ok(())
    }
}
