//! Reusable scratch buffers for transient reads.

use std::ops::{Deref, DerefMut};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::sync::{Arc, Mutex};

use crate::buffer::ByteBuffer;

/// Channel-freelist pool of [`ByteBuffer`]s.
///
/// Acquired buffers arrive cleared (fill mode, full capacity) and return to
/// the pool when the guard drops. The pool grows on demand: an empty
/// freelist allocates a fresh buffer rather than blocking.
#[derive(Clone)]
pub struct BufferPool {
    sender: Sender<ByteBuffer>,
    receiver: Arc<Mutex<Receiver<ByteBuffer>>>,
    buffer_capacity: usize,
}

impl BufferPool {
    pub fn new(initial: usize, buffer_capacity: usize) -> Self {
        let (sender, receiver) = channel();
        for _ in 0..initial {
            // the receiver is alive, the send cannot fail
            let _ = sender.send(ByteBuffer::with_capacity(buffer_capacity));
        }
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            buffer_capacity,
        }
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    pub fn acquire(&self) -> PooledBuffer {
        let mut buffer = match self.receiver.lock().unwrap().try_recv() {
            Ok(buf) => buf,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                ByteBuffer::with_capacity(self.buffer_capacity)
            }
        };
        buffer.clear();
        PooledBuffer {
            buffer: Some(buffer),
            freelist: self.sender.clone(),
        }
    }
}

/// Guard over a pooled buffer; returns it to the pool on drop.
pub struct PooledBuffer {
    buffer: Option<ByteBuffer>,
    freelist: Sender<ByteBuffer>,
}

impl Deref for PooledBuffer {
    type Target = ByteBuffer;

    fn deref(&self) -> &ByteBuffer {
        self.buffer.as_ref().expect("buffer present until drop")
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut ByteBuffer {
        self.buffer.as_mut().expect("buffer present until drop")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            let _ = self.freelist.send(buffer);
        }
    }
}
