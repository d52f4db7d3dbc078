use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// A temporary directory that is deleted when it goes out of scope.
/// Used by tests and benches that need a scratch `BlockStore` directory.
pub struct TestDir {
    pub path: PathBuf,
}

impl TestDir {
    pub fn new<P>(path: P) -> Self
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path).expect("Failure while creating test directory");
        Self { path }
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.path).unwrap();
    }
}

impl AsRef<Path> for TestDir {
    fn as_ref(&self) -> &Path {
        self.path.as_ref()
    }
}

/// Generate a random number using /dev/urandom.
pub fn generate_random_number() -> usize {
    let mut f = File::open("/dev/urandom").unwrap();
    let mut buf = [0u8; 8];
    f.read_exact(&mut buf).unwrap();
    usize::from_le_bytes(buf)
}
