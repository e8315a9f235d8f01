//! Where the server's files come from.
//!
//! A worker only needs to turn a requested name into an ordered stream of
//! bytes; [`SourceStore`] is that seam. [`DirStore`] serves a directory on
//! disk, [`MemoryStore`] serves named byte buffers.

use std::collections::HashMap;
use std::future::Future;
use std::io::{Error, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use async_std::io::{Cursor, Read};

/// What [`SourceStore::open`] hands back; it runs on the worker's task.
pub type OpenFuture<'a, T> = Pin<Box<dyn Future<Output = std::io::Result<T>> + Send + 'a>>;

pub trait SourceStore {
    type Source: Read + Unpin + Send;

    /// Opens `name` for reading from the start.
    ///
    /// A name that doesn't exist must fail with `ErrorKind::NotFound`.
    fn open<'a>(&'a self, name: &'a str) -> OpenFuture<'a, Self::Source>;
}

/// Serves files below a root directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        DirStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a requested name onto a path below the root.
    fn resolve(&self, name: &str) -> std::io::Result<PathBuf> {
        let path = Path::new(name);

        if name.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "Empty file name."));
        }

        // Client needn't know anything about the server's host.
        if path.is_absolute() || path.has_root() {
            return Err(Error::new(
                ErrorKind::PermissionDenied,
                "File path must not start with root.",
            ));
        }

        // Client isn't allowed to traverse the served directory upwards.
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(Error::new(
                ErrorKind::PermissionDenied,
                "File path must not leave the served directory.",
            ));
        }

        Ok(self.root.join(path))
    }
}

impl SourceStore for DirStore {
    type Source = async_std::fs::File;

    fn open<'a>(&'a self, name: &'a str) -> OpenFuture<'a, Self::Source> {
        Box::pin(async move {
            let path = self.resolve(name)?;
            let fd = async_std::fs::File::open(&path).await?;
            if fd.metadata().await?.is_dir() {
                return Err(Error::new(ErrorKind::InvalidInput, "Can't read a directory."));
            }

            Ok(fd)
        })
    }
}

/// Serves byte buffers registered under a name.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn insert<N: Into<String>>(&mut self, name: N, contents: Vec<u8>) {
        self.files.insert(name.into(), contents);
    }

    pub fn with_file<N: Into<String>>(mut self, name: N, contents: Vec<u8>) -> Self {
        self.insert(name, contents);
        self
    }
}

impl SourceStore for MemoryStore {
    type Source = Cursor<Vec<u8>>;

    fn open<'a>(&'a self, name: &'a str) -> OpenFuture<'a, Self::Source> {
        let source = self
            .files
            .get(name)
            .map(|contents| Cursor::new(contents.clone()))
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("{} was not found.", name)));
        Box::pin(async move { source })
    }
}
