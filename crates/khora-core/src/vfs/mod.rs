// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Virtual File System (VFS) contracts for path-based file access.
//!
//! This module provides the [`VirtualFileSystem`] trait, the narrow interface the
//! I/O services use to reach file bytes. A VFS opens files by path and hands back a
//! [`VfsFile`], a positional reader/writer that is closed when dropped. Concrete
//! filesystems (a directory on disk, an in-memory store) live in `khora-infra`.

mod error;

pub use self::error::VfsError;

use std::fmt::Debug;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Open an existing file for reading.
    Read,
    /// Create the file, or truncate it if it exists, for writing.
    Write,
    /// Open an existing file, or create it, for reading and writing without truncation.
    ReadWrite,
}

impl OpenMode {
    /// Whether files opened in this mode can be read.
    pub fn can_read(&self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    /// Whether files opened in this mode can be written.
    pub fn can_write(&self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::ReadWrite)
    }
}

/// An open file. Dropping it closes the file.
pub trait VfsFile: Send + Debug {
    /// The path this file was opened with.
    fn path(&self) -> &str;

    /// Returns the current length of the file in bytes.
    fn size(&self) -> Result<u64, VfsError>;

    /// Reads up to `dst.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read; `0` means `offset` is at or past the end.
    fn read(&mut self, dst: &mut [u8], offset: u64) -> Result<usize, VfsError>;

    /// Writes `src` starting at `offset`, growing the file if needed.
    fn write(&mut self, src: &[u8], offset: u64) -> Result<usize, VfsError>;

    /// Fills `dst` entirely from `offset`, failing if the file ends first.
    fn read_exact_at(&mut self, dst: &mut [u8], offset: u64) -> Result<(), VfsError> {
        let mut filled = 0;
        while filled < dst.len() {
            let read = self.read(&mut dst[filled..], offset + filled as u64)?;
            if read == 0 {
                return Err(VfsError::UnexpectedEof {
                    path: self.path().to_string(),
                    expected: dst.len() as u64,
                    read: filled as u64,
                });
            }
            filled += read;
        }
        Ok(())
    }
}

/// A path-based filesystem.
///
/// Implementations must be shareable between the caller threads that build
/// requests and the worker threads that execute them.
pub trait VirtualFileSystem: Send + Sync + Debug + 'static {
    /// Opens the file at `path`.
    ///
    /// # Errors
    /// Returns [`VfsError::NotFound`] when a file opened with [`OpenMode::Read`]
    /// does not exist.
    fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn VfsFile>, VfsError>;

    /// Returns `true` if a file exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Creates or replaces the file at `path` with `bytes`.
    fn write_all(&self, path: &str, bytes: &[u8]) -> Result<(), VfsError> {
        let mut file = self.open(path, OpenMode::Write)?;
        let mut written = 0;
        while written < bytes.len() {
            let n = file.write(&bytes[written..], written as u64)?;
            if n == 0 {
                return Err(VfsError::WriteZero {
                    path: path.to_string(),
                });
            }
            written += n;
        }
        Ok(())
    }

    /// Reads the whole file at `path`.
    fn read_all(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        let mut file = self.open(path, OpenMode::Read)?;
        let mut bytes = vec![0; file.size()? as usize];
        file.read_exact_at(&mut bytes, 0)?;
        Ok(bytes)
    }
}
