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

use std::fmt;

/// An error raised by a [`VirtualFileSystem`](super::VirtualFileSystem) or one of its files.
#[derive(Debug)]
pub enum VfsError {
    /// No file exists at the given path.
    NotFound {
        /// The path that was looked up.
        path: String,
    },
    /// The operation is not allowed by the mode the file was opened with.
    InvalidMode {
        /// The path of the file.
        path: String,
    },
    /// The file ended before the requested range was read.
    UnexpectedEof {
        /// The path of the file.
        path: String,
        /// The number of bytes requested.
        expected: u64,
        /// The number of bytes actually read.
        read: u64,
    },
    /// A write made no progress.
    WriteZero {
        /// The path of the file.
        path: String,
    },
    /// The path escapes the filesystem root or is otherwise malformed.
    InvalidPath {
        /// The offending path.
        path: String,
    },
    /// An error reported by the underlying operating system.
    Io {
        /// The path of the file.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::NotFound { path } => write!(f, "File '{path}' not found."),
            VfsError::InvalidMode { path } => {
                write!(f, "Operation not permitted by the open mode of '{path}'.")
            }
            VfsError::UnexpectedEof {
                path,
                expected,
                read,
            } => write!(
                f,
                "Unexpected end of '{path}': expected {expected} bytes, read {read}."
            ),
            VfsError::WriteZero { path } => write!(f, "Write to '{path}' made no progress."),
            VfsError::InvalidPath { path } => write!(f, "Invalid path '{path}'."),
            VfsError::Io { path, source } => write!(f, "I/O error on '{path}': {source}"),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VfsError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
