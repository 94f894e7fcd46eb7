use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{self, AsyncReadExt, AsyncWriteExt},
};

/// Reads the whole file under a shared lock. Missing files are reported as `None`.
pub async fn read_shared(path: &Path) -> Result<Option<Vec<u8>>, io::Error> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    file.lock_shared()?;
    let mut content = Vec::new();
    let result = file.read_to_end(&mut content).await;
    file.unlock_async().await?;
    result?;
    Ok(Some(content))
}

/// Replaces the content of `path` in one step: the data is written into a sibling temporary
/// file which is then renamed over the target, so readers never see a half written file.
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), io::Error> {
    let temporary = temporary_path(path);
    let mut file = File::create(&temporary).await?;
    file.lock_exclusive()?;
    let written = async {
        file.write_all(content).await?;
        file.sync_all().await
    }
    .await;
    file.unlock_async().await?;
    drop(file);
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temporary).await;
        return Err(e);
    }
    tokio::fs::rename(&temporary, path).await
}

/// Holds an exclusive lock on a sidecar file for the duration of a read-modify-write cycle.
pub struct ExclusiveLock {
    file: File,
}

impl ExclusiveLock {
    pub async fn acquire(path: &Path) -> Result<Self, io::Error> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    pub async fn release(self) -> Result<(), io::Error> {
        self.file.unlock_async().await
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|v| v.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
