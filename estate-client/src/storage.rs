//! Синхронное строковое key/value-хранилище.
//!
//! Играет роль `localStorage` (сессия) и `sessionStorage` (кэш страниц):
//! в памяти для тестов и долгоживущих процессов, в файлах для CLI.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::{EstateClientError, EstateClientResult};

/// Хранилище строк по ключу.
pub trait KeyValueStorage: Send + Sync {
    /// Читает значение; при отсутствии ключа `Ok(None)`.
    fn get(&self, key: &str) -> EstateClientResult<Option<String>>;
    /// Записывает значение, перезаписывая существующее.
    fn set(&self, key: &str, value: &str) -> EstateClientResult<()>;
    /// Удаляет значение; удаление отсутствующего ключа не ошибка.
    fn remove(&self, key: &str) -> EstateClientResult<()>;
    /// Удаляет все ключи с заданным префиксом.
    fn remove_prefix(&self, prefix: &str) -> EstateClientResult<()>;
}

#[derive(Debug, Default)]
/// Хранилище в памяти процесса.
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Пустое хранилище.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> EstateClientResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> EstateClientResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> EstateClientResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> EstateClientResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Хранилище в каталоге: один файл на ключ.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Создаёт каталог, если его ещё нет.
    pub fn open(dir: impl Into<PathBuf>) -> EstateClientResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| storage_error(&dir, err))?;
        Ok(Self { dir })
    }

    /// Каталог хранилища.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name = sanitize(key);
        if file_name.chars().all(|ch| ch == '.') {
            return self.dir.join(format!("_{file_name}"));
        }
        self.dir.join(file_name)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> EstateClientResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(storage_error(&path, err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> EstateClientResult<()> {
        let path = self.path_for(key);
        fs::write(&path, value).map_err(|err| storage_error(&path, err))
    }

    fn remove(&self, key: &str) -> EstateClientResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error(&path, err)),
        }
    }

    fn remove_prefix(&self, prefix: &str) -> EstateClientResult<()> {
        let prefix = sanitize(prefix);
        let dir = fs::read_dir(&self.dir).map_err(|err| storage_error(&self.dir, err))?;
        for entry in dir {
            let entry = entry.map_err(|err| storage_error(&self.dir, err))?;
            if !entry.file_name().to_string_lossy().starts_with(&prefix) {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(storage_error(&path, err)),
            }
        }
        Ok(())
    }
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn storage_error(path: &Path, err: io::Error) -> EstateClientError {
    EstateClientError::Storage(format!("{}: {err}", path.display()))
}
