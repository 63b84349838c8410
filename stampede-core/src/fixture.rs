use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::ConfigError;
use crate::scenario::BodySource;
use crate::template::Template;

/// Materializes request bodies referenced by name.
pub trait FixtureLoader {
    fn load_body(&self, path: &Path) -> io::Result<Bytes>;
}

/// Reads fixtures from disk. Relative paths resolve against `root`.
#[derive(Debug, Clone)]
pub struct FsFixtureLoader {
    root: PathBuf,
}

impl FsFixtureLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl FixtureLoader for FsFixtureLoader {
    fn load_body(&self, path: &Path) -> io::Result<Bytes> {
        std::fs::read(self.resolve(path)).map(Bytes::from)
    }
}

fn read(loader: &dyn FixtureLoader, path: &Path) -> Result<Bytes, ConfigError> {
    loader
        .load_body(path)
        .map_err(|source| ConfigError::Fixture {
            path: path.to_path_buf(),
            source,
        })
}

/// Load a fixture as a raw body.
pub fn load_fixture(loader: &dyn FixtureLoader, path: &Path) -> Result<BodySource, ConfigError> {
    read(loader, path).map(BodySource::Bytes)
}

/// Load a fixture whose text contains `${key}` session references.
pub fn load_fixture_template(
    loader: &dyn FixtureLoader,
    path: &Path,
) -> Result<BodySource, ConfigError> {
    let bytes = read(loader, path)?;
    let text =
        std::str::from_utf8(&bytes).map_err(|_| ConfigError::FixtureNotUtf8(path.to_path_buf()))?;
    Ok(BodySource::Template(Template::parse(text)?))
}
