//! Fixed-size page buffer.
//!
//! Page size is a compile-time constant selected via Cargo features:
//! exactly one of `page-4k`, `page-8k`, or `page-1m` must be enabled.

#[cfg(feature = "page-4k")]
pub const PAGE_SIZE_BYTES: usize = 4096;
#[cfg(feature = "page-8k")]
pub const PAGE_SIZE_BYTES: usize = 8192;
#[cfg(feature = "page-1m")]
pub const PAGE_SIZE_BYTES: usize = 1024 * 1024;

#[cfg(not(any(feature = "page-4k", feature = "page-8k", feature = "page-1m")))]
compile_error!(
    "One of `page-4k`, `page-8k`, or `page-1m` features must be enabled to select a page size."
);

/// An in-memory slot's page bytes: a plain fixed-size buffer.
///
/// The buffer pool core treats page contents as opaque bytes; the
/// access-method layer that interprets them is an external collaborator.
#[derive(Debug, Clone)]
pub struct Page {
    bytes: Vec<u8>,
}

impl Page {
    const INT_BYTES: usize = 4;

    pub fn new() -> Self {
        Self {
            bytes: vec![0; PAGE_SIZE_BYTES],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        debug_assert_eq!(bytes.len(), PAGE_SIZE_BYTES);
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn get_int(&self, offset: usize) -> i32 {
        let buf: [u8; Self::INT_BYTES] = self.bytes[offset..offset + Self::INT_BYTES]
            .try_into()
            .unwrap();
        i32::from_be_bytes(buf)
    }

    pub fn set_int(&mut self, offset: usize, n: i32) {
        self.bytes[offset..offset + Self::INT_BYTES].copy_from_slice(&n.to_be_bytes());
    }

    pub fn get_bytes(&self, offset: usize) -> Vec<u8> {
        let len_buf: [u8; Self::INT_BYTES] = self.bytes[offset..offset + Self::INT_BYTES]
            .try_into()
            .unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;
        let start = offset + Self::INT_BYTES;
        self.bytes[start..start + len].to_vec()
    }

    pub fn set_bytes(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + Self::INT_BYTES]
            .copy_from_slice(&(data.len() as u32).to_be_bytes());
        let start = offset + Self::INT_BYTES;
        self.bytes[start..start + data.len()].copy_from_slice(data);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
