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
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

/// A VFS over a directory of the local filesystem.
///
/// Paths are relative to the root and use `/` as separator. Absolute paths and
/// `..` components are rejected so that nothing outside the root is reachable.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    /// Creates a filesystem rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory every path is resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, VfsError> {
        let relative = Path::new(path);
        let is_plain = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !is_plain {
            return Err(VfsError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &str, source: io::Error) -> VfsError {
    if source.kind() == io::ErrorKind::NotFound {
        VfsError::NotFound {
            path: path.to_string(),
        }
    } else {
        VfsError::Io {
            path: path.to_string(),
            source,
        }
    }
}

impl VirtualFileSystem for LocalFileSystem {
    fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn VfsFile>, VfsError> {
        let full_path = self.resolve(path)?;
        if mode.can_write() {
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).map_err(|e| io_error(path, e))?;
            }
        }

        let file = match mode {
            OpenMode::Read => File::open(&full_path),
            OpenMode::Write => File::create(&full_path),
            OpenMode::ReadWrite => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&full_path),
        }
        .map_err(|e| io_error(path, e))?;

        log::trace!("LocalFileSystem: opened '{}' ({:?})", full_path.display(), mode);
        Ok(Box::new(LocalFile {
            path: path.to_string(),
            file,
            mode,
        }))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| p.is_file())
    }
}

#[derive(Debug)]
struct LocalFile {
    path: String,
    file: File,
    mode: OpenMode,
}

impl LocalFile {
    fn invalid_mode(&self) -> VfsError {
        VfsError::InvalidMode {
            path: self.path.clone(),
        }
    }
}

impl VfsFile for LocalFile {
    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> Result<u64, VfsError> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| io_error(&self.path, e))
    }

    fn read(&mut self, dst: &mut [u8], offset: u64) -> Result<usize, VfsError> {
        if !self.mode.can_read() {
            return Err(self.invalid_mode());
        }
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read(dst))
            .map_err(|e| io_error(&self.path, e))
    }

    fn write(&mut self, src: &[u8], offset: u64) -> Result<usize, VfsError> {
        if !self.mode.can_write() {
            return Err(self.invalid_mode());
        }
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write(src))
            .map_err(|e| io_error(&self.path, e))
    }
}
