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

use khora_core::vfs::{OpenMode, VfsError, VfsFile, VirtualFileSystem};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type FileData = Arc<RwLock<Vec<u8>>>;

/// A thread-safe VFS kept entirely in memory.
///
/// Open files share their contents with the filesystem: writes through one
/// handle are visible to every other handle on the same path.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<HashMap<String, FileData>>,
}

impl MemoryFileSystem {
    /// Creates an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes the file at `path`. Returns `true` if it existed.
    pub fn remove(&self, path: &str) -> bool {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
            .is_some()
    }

    /// Number of files stored.
    pub fn file_count(&self) -> usize {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl VirtualFileSystem for MemoryFileSystem {
    fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn VfsFile>, VfsError> {
        if path.is_empty() {
            return Err(VfsError::InvalidPath {
                path: path.to_string(),
            });
        }

        let data = match mode {
            OpenMode::Read => self
                .files
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(path)
                .cloned()
                .ok_or_else(|| VfsError::NotFound {
                    path: path.to_string(),
                })?,
            OpenMode::Write => {
                let data = FileData::default();
                self.files
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(path.to_string(), Arc::clone(&data));
                data
            }
            OpenMode::ReadWrite => Arc::clone(
                self.files
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(path.to_string())
                    .or_default(),
            ),
        };

        Ok(Box::new(MemoryFile {
            path: path.to_string(),
            data,
            mode,
        }))
    }

    fn exists(&self, path: &str) -> bool {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }
}

#[derive(Debug)]
struct MemoryFile {
    path: String,
    data: FileData,
    mode: OpenMode,
}

impl VfsFile for MemoryFile {
    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> Result<u64, VfsError> {
        Ok(self.data.read().unwrap_or_else(PoisonError::into_inner).len() as u64)
    }

    fn read(&mut self, dst: &mut [u8], offset: u64) -> Result<usize, VfsError> {
        if !self.mode.can_read() {
            return Err(VfsError::InvalidMode {
                path: self.path.clone(),
            });
        }
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let count = dst.len().min(data.len() - start);
        dst[..count].copy_from_slice(&data[start..start + count]);
        Ok(count)
    }

    fn write(&mut self, src: &[u8], offset: u64) -> Result<usize, VfsError> {
        if !self.mode.can_write() {
            return Err(VfsError::InvalidMode {
                path: self.path.clone(),
            });
        }
        let start = usize::try_from(offset).map_err(|_| VfsError::InvalidPath {
            path: self.path.clone(),
        })?;
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let end = start + src.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(src);
        Ok(src.len())
    }
}
