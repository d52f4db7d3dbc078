//! The block/file layer: an external collaborator consumed via a narrow
//! synchronous interface. Given a block identity it reads a fixed-size
//! page into a supplied buffer, writes it back, and appends a new block.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::block::BlockId;
use crate::page::{Page, PAGE_SIZE_BYTES};

/// Synchronous byte-level storage service consumed by the pool core.
///
/// Implementations must be `Send + Sync`: frames hold a shared reference and
/// invoke these methods while only the frame's own swap lock is held, so
/// the store itself is responsible for any internal synchronization its
/// backing resource requires.
pub trait BlockStore: std::fmt::Debug + Send + Sync {
    fn block_size(&self) -> usize;
    fn length(&self, filename: &str) -> io::Result<usize>;
    fn read(&self, block_id: &BlockId, page: &mut Page) -> io::Result<()>;
    fn write(&self, block_id: &BlockId, page: &Page) -> io::Result<()>;
    fn append(&self, filename: &str) -> io::Result<BlockId>;
    fn sync(&self, filename: &str) -> io::Result<()>;
}

/// A real, file-backed implementation: one open file handle per distinct
/// file name, synchronous `seek` + `read`/`write`.
#[derive(Debug)]
pub struct FileBlockStore {
    directory: PathBuf,
    open_files: Mutex<HashMap<String, File>>,
}

impl FileBlockStore {
    pub fn new<P: AsRef<Path>>(directory: P) -> io::Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            open_files: Mutex::new(HashMap::new()),
        })
    }

    fn with_file<F, T>(&self, filename: &str, f: F) -> io::Result<T>
    where
        F: FnOnce(&mut File) -> io::Result<T>,
    {
        let mut open_files = self.open_files.lock().unwrap();
        let file = match open_files.get_mut(filename) {
            Some(file) => file,
            None => {
                let path = self.directory.join(filename);
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(path)?;
                open_files.entry(filename.to_string()).or_insert(file)
            }
        };
        f(file)
    }
}

impl BlockStore for FileBlockStore {
    fn block_size(&self) -> usize {
        PAGE_SIZE_BYTES
    }

    fn length(&self, filename: &str) -> io::Result<usize> {
        self.with_file(filename, |file| {
            let len = file.metadata()?.len() as usize;
            Ok(len / PAGE_SIZE_BYTES)
        })
    }

    fn read(&self, block_id: &BlockId, page: &mut Page) -> io::Result<()> {
        self.with_file(&block_id.filename, |file| {
            file.seek(SeekFrom::Start((block_id.block_num * PAGE_SIZE_BYTES) as u64))?;
            match file.read_exact(page.bytes_mut()) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    page.bytes_mut().fill(0);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        })
    }

    fn write(&self, block_id: &BlockId, page: &Page) -> io::Result<()> {
        self.with_file(&block_id.filename, |file| {
            file.seek(SeekFrom::Start((block_id.block_num * PAGE_SIZE_BYTES) as u64))?;
            file.write_all(page.bytes())
        })
    }

    fn append(&self, filename: &str) -> io::Result<BlockId> {
        let new_block_num = self.length(filename)?;
        let block_id = BlockId::new(filename, new_block_num);
        let blank = Page::new();
        self.with_file(filename, |file| {
            file.seek(SeekFrom::Start((new_block_num * PAGE_SIZE_BYTES) as u64))?;
            file.write_all(blank.bytes())
        })?;
        Ok(block_id)
    }

    fn sync(&self, filename: &str) -> io::Result<()> {
        self.with_file(filename, |file| file.sync_all())
    }
}

/// An in-memory store for tests, including a fault-injection hook so the
/// pool's I/O-failure rollback semantics can be exercised without touching
/// the filesystem.
#[derive(Debug, Default)]
pub struct MemBlockStore {
    files: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    fail_read_on: Mutex<Option<BlockId>>,
    fail_write_on: Mutex<Option<BlockId>>,
}

impl MemBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `read` for this block fails with `io::ErrorKind::Other`.
    pub fn fail_next_read(&self, block_id: BlockId) {
        *self.fail_read_on.lock().unwrap() = Some(block_id);
    }

    /// The next `write` for this block fails with `io::ErrorKind::Other`.
    pub fn fail_next_write(&self, block_id: BlockId) {
        *self.fail_write_on.lock().unwrap() = Some(block_id);
    }
}

impl BlockStore for MemBlockStore {
    fn block_size(&self) -> usize {
        PAGE_SIZE_BYTES
    }

    fn length(&self, filename: &str) -> io::Result<usize> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(filename)
            .map(Vec::len)
            .unwrap_or(0))
    }

    fn read(&self, block_id: &BlockId, page: &mut Page) -> io::Result<()> {
        let mut fail_slot = self.fail_read_on.lock().unwrap();
        if fail_slot.as_ref() == Some(block_id) {
            *fail_slot = None;
            return Err(io::Error::other("injected read failure"));
        }
        drop(fail_slot);
        let files = self.files.lock().unwrap();
        match files
            .get(&block_id.filename)
            .and_then(|blocks| blocks.get(block_id.block_num))
        {
            Some(bytes) => {
                page.bytes_mut().copy_from_slice(bytes);
                Ok(())
            }
            None => {
                page.bytes_mut().fill(0);
                Ok(())
            }
        }
    }

    fn write(&self, block_id: &BlockId, page: &Page) -> io::Result<()> {
        let mut fail_slot = self.fail_write_on.lock().unwrap();
        if fail_slot.as_ref() == Some(block_id) {
            *fail_slot = None;
            return Err(io::Error::other("injected write failure"));
        }
        drop(fail_slot);
        let mut files = self.files.lock().unwrap();
        let blocks = files.entry(block_id.filename.clone()).or_default();
        if blocks.len() <= block_id.block_num {
            blocks.resize(block_id.block_num + 1, vec![0; PAGE_SIZE_BYTES]);
        }
        blocks[block_id.block_num] = page.bytes().to_vec();
        Ok(())
    }

    fn append(&self, filename: &str) -> io::Result<BlockId> {
        let mut files = self.files.lock().unwrap();
        let blocks = files.entry(filename.to_string()).or_default();
        let block_num = blocks.len();
        blocks.push(vec![0; PAGE_SIZE_BYTES]);
        Ok(BlockId::new(filename, block_num))
    }

    fn sync(&self, _filename: &str) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_store_append_then_read_round_trips() {
        let store = MemBlockStore::new();
        let block_id = store.append("f").unwrap();
        let mut page = Page::new();
        page.set_int(0, 42);
        store.write(&block_id, &page).unwrap();

        let mut read_back = Page::new();
        store.read(&block_id, &mut read_back).unwrap();
        assert_eq!(read_back.get_int(0), 42);
    }

    #[test]
    fn mem_store_injects_read_failure_once() {
        let store = MemBlockStore::new();
        let block_id = store.append("f").unwrap();
        store.fail_next_read(block_id.clone());

        let mut page = Page::new();
        assert!(store.read(&block_id, &mut page).is_err());
        assert!(store.read(&block_id, &mut page).is_ok());
    }
}
