use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::bail;

use super::Storage;

const TMP_SUFFIX: &str = ".tmp";

// Maps every key onto a file under `dir`; '/' in keys become directories.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn open<P>(dir: P) -> anyhow::Result<Self>
    where
        P: Into<PathBuf>,
    {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(FsStore { dir })
    }

    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    fn path(&self, key: &str) -> anyhow::Result<PathBuf> {
        if key.is_empty() || key.split('/').any(|part| part.is_empty() || part == "..") {
            bail!("invalid store key {:?}", key);
        }
        Ok(self.dir.join(key))
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> anyhow::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            if entry.file_type()?.is_dir() {
                self.walk(&entry.path(), &key, out)?;
            } else if !key.ends_with(TMP_SUFFIX) {
                out.push(key);
            }
        }
        Ok(())
    }
}

impl Storage for FsStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match fs::read(self.path(key)?) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_path = path.clone().into_os_string();
        tmp_path.push(TMP_SUFFIX);

        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&tmp_path)?;
        file.write_all(value)?;
        file.sync_all()?;

        // TODO: fsync the parent directory so the rename itself is durable.
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.path(key)?.is_file())
    }

    fn len(&self, key: &str) -> anyhow::Result<Option<usize>> {
        match fs::metadata(self.path(key)?) {
            Ok(meta) => Ok(Some(meta.len().try_into()?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut out = Vec::new();
        self.walk(&self.dir, "", &mut out)?;
        out.retain(|k| k.starts_with(prefix));
        out.sort();
        Ok(out)
    }
}
