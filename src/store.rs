// Converted frame storage
//
// Every converted frame gets its own anonymous memory map, sized exactly to
// the conversion output. Keeping each frame in OS-backed memory rather than
// on the heap lets the store hold seconds of raw YUV without pressuring the
// allocator, and releasing a frame is just dropping its map.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

/// One immutable converted frame in its own OS-backed allocation.
pub struct StoredFrame {
    map: memmap2::Mmap,
}

impl StoredFrame {
    /// Allocate a new backing map and copy `data` into it.
    pub fn copy_from(data: &[u8]) -> io::Result<StoredFrame> {
        if data.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty frame data",
            ));
        }
        let mut map = memmap2::MmapMut::map_anon(data.len())?;
        map.copy_from_slice(data);
        Ok(StoredFrame {
            map: map.make_read_only()?,
        })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    /// Copy the frame bytes into `dst`, returning how many were copied.
    /// A return of 0 means the frame is unreadable.
    pub fn read_into(&self, dst: &mut [u8]) -> usize {
        let len = self.map.len().min(dst.len());
        dst[..len].copy_from_slice(&self.map[..len]);
        len
    }
}

/// Append-only ordered sequence of converted frames.
///
/// Shared between the conversion worker (appends) and the encode engine
/// (snapshots). `clear` drops the store's handles; backing memory for a
/// frame is released once no snapshot references it either.
#[derive(Default)]
pub struct FrameStore {
    frames: Mutex<Vec<Arc<StoredFrame>>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, frame: StoredFrame) {
        self.frames.lock().push(Arc::new(frame));
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Handles to all frames currently stored, in append order.
    pub fn snapshot(&self) -> Vec<Arc<StoredFrame>> {
        self.frames.lock().clone()
    }

    /// Drop every stored frame.
    pub fn clear(&self) {
        self.frames.lock().clear();
    }
}
