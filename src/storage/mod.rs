use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{PoisonError, RwLock};

/// Environment variable holding a base64-encoded age identity for
/// [`EncryptedFilesystemStorage::from_env`].
pub const ENCRYPTION_KEY_ENV: &str = "TOKENBROKER_ENCRYPTION_KEY";

/// Boxed future returned by every [`PersistenceAdapter`] operation
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Durable key/value storage that survives full-page redirects
///
/// The web session is the only writer of its auth-related keys. Values are
/// plain strings; numeric values are stored as their decimal representation.
/// Implementations must treat `remove` of an absent key as a success.
pub trait PersistenceAdapter: Send + Sync {
    /// Read the value stored under `key`, `None` if nothing is stored
    fn get(&self, key: &str) -> StorageFuture<'_, Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> StorageFuture<'_, ()>;

    /// Remove the value stored under `key`
    fn remove(&self, key: &str) -> StorageFuture<'_, ()>;
}

/// Storage errors
#[derive(Debug)]
pub enum StorageError {
    /// IO error
    Io(std::io::Error),
    /// Stored data could not be decoded
    Config(String),
    /// Keyring error
    Keyring(String),
    /// Encryption error
    Encryption(String),
    /// Encryption key could not be loaded
    KeyStorage(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::Config(msg) => write!(f, "Configuration error: {}", msg),
            StorageError::Keyring(msg) => write!(f, "Keyring error: {}", msg),
            StorageError::Encryption(msg) => write!(f, "Encryption error: {}", msg),
            StorageError::KeyStorage(msg) => write!(f, "Key storage error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<keyring::Error> for StorageError {
    fn from(err: keyring::Error) -> Self {
        StorageError::Keyring(err.to_string())
    }
}

/// In-process storage
///
/// Suitable for tests and for hosts (embedded webviews, servers) that keep
/// their own durable state and only need the adapter seam.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistenceAdapter for MemoryStorage {
    fn get(&self, key: &str) -> StorageFuture<'_, Option<String>> {
        let value = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        Box::pin(async move { Ok(value) })
    }

    fn set(&self, key: &str, value: &str) -> StorageFuture<'_, ()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Box::pin(async { Ok(()) })
    }

    fn remove(&self, key: &str) -> StorageFuture<'_, ()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Box::pin(async { Ok(()) })
    }
}

/// Keyring-based storage for session tokens
///
/// Each key becomes one credential entry under `service_name` in the
/// OS-native store (macOS Keychain, Secret Service, Windows Credential Manager).
pub struct KeyringStorage {
    service_name: String,
}

impl KeyringStorage {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(service_name: &str, key: &str) -> Result<keyring::Entry, StorageError> {
        keyring::Entry::new(service_name, key)
            .map_err(|e| StorageError::Keyring(format!("Failed to create keyring entry: {}", e)))
    }
}

impl PersistenceAdapter for KeyringStorage {
    fn get(&self, key: &str) -> StorageFuture<'_, Option<String>> {
        let key = key.to_string();

        Box::pin(async move {
            let entry = Self::entry(&self.service_name, &key)?;
            match entry.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn set(&self, key: &str, value: &str) -> StorageFuture<'_, ()> {
        let key = key.to_string();
        let value = value.to_string();

        Box::pin(async move {
            let entry = Self::entry(&self.service_name, &key)?;
            entry.set_password(&value)?;
            tracing::debug!(
                "Stored value in keyring: service={}, key={}",
                self.service_name,
                key
            );
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> StorageFuture<'_, ()> {
        let key = key.to_string();

        Box::pin(async move {
            let entry = Self::entry(&self.service_name, &key)?;
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {
                    tracing::debug!(
                        "Removed value from keyring: service={}, key={}",
                        self.service_name,
                        key
                    );
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        })
    }
}

/// Filesystem-based storage, one file per key
///
/// Values are written **unencrypted**. Use [`KeyringStorage`] or
/// [`EncryptedFilesystemStorage`] for anything that holds bearer tokens
/// outside of development.
pub struct FilesystemStorage {
    base_path: PathBuf,
}

impl FilesystemStorage {
    /// Create a new filesystem storage rooted at `base_path`
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();

        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }

        Ok(Self { base_path })
    }

    fn resolve_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

/// Read a file, mapping "not found" to `None`
async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove a file, treating "not found" as already removed
async fn remove_optional(path: &Path) -> Result<(), StorageError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn utf8(data: Vec<u8>) -> Result<String, StorageError> {
    String::from_utf8(data).map_err(|e| StorageError::Config(format!("Invalid UTF-8 data: {}", e)))
}

impl PersistenceAdapter for FilesystemStorage {
    fn get(&self, key: &str) -> StorageFuture<'_, Option<String>> {
        let full_path = self.resolve_path(key);

        Box::pin(async move { read_optional(&full_path).await?.map(utf8).transpose() })
    }

    fn set(&self, key: &str, value: &str) -> StorageFuture<'_, ()> {
        let full_path = self.resolve_path(key);
        let value = value.to_string();

        Box::pin(async move {
            if let Some(parent) = full_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            tokio::fs::write(&full_path, value).await?;
            tracing::debug!("Wrote value to filesystem: {:?}", full_path);
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> StorageFuture<'_, ()> {
        let full_path = self.resolve_path(key);

        Box::pin(async move {
            remove_optional(&full_path).await?;
            tracing::debug!("Removed value from filesystem: {:?}", full_path);
            Ok(())
        })
    }
}

/// Encrypted filesystem storage
///
/// Every value is encrypted at rest with an age x25519 identity. The identity
/// is supplied by the caller, or read from [`ENCRYPTION_KEY_ENV`] (base64 of the
/// `AGE-SECRET-KEY-1...` string) by [`EncryptedFilesystemStorage::from_env`].
///
/// Keep the key out of version control; in containers inject it through the
/// platform's secret manager.
pub struct EncryptedFilesystemStorage {
    inner: FilesystemStorage,
    recipient: age::x25519::Recipient,
    identity: age::x25519::Identity,
}

impl EncryptedFilesystemStorage {
    /// Create encrypted storage at `base_path` using an explicit identity
    pub fn new(
        base_path: impl AsRef<Path>,
        identity: age::x25519::Identity,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            inner: FilesystemStorage::new(base_path)?,
            recipient: identity.to_public(),
            identity,
        })
    }

    /// Create encrypted storage at `base_path` with the key from [`ENCRYPTION_KEY_ENV`]
    pub fn from_env(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let encoded = std::env::var(ENCRYPTION_KEY_ENV).map_err(|_| {
            StorageError::KeyStorage(format!("{} is not set", ENCRYPTION_KEY_ENV))
        })?;
        tracing::debug!("Using encryption key from {}", ENCRYPTION_KEY_ENV);
        Self::new(base_path, decode_identity(&encoded)?)
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        use std::io::Write;

        let encryptor = age::Encryptor::with_recipients(vec![Box::new(self.recipient.clone())])
            .ok_or_else(|| StorageError::Encryption("No recipients for encryptor".to_string()))?;

        let mut ciphertext = Vec::new();
        let mut writer = encryptor
            .wrap_output(&mut ciphertext)
            .map_err(|e| StorageError::Encryption(format!("Failed to wrap output: {}", e)))?;
        writer
            .write_all(plaintext)
            .map_err(|e| StorageError::Encryption(format!("Failed to encrypt value: {}", e)))?;
        writer
            .finish()
            .map_err(|e| StorageError::Encryption(format!("Failed to finalize encryption: {}", e)))?;

        Ok(ciphertext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, StorageError> {
        use std::io::Read;

        let decryptor = match age::Decryptor::new(ciphertext)
            .map_err(|e| StorageError::Encryption(format!("Failed to create decryptor: {}", e)))?
        {
            age::Decryptor::Recipients(d) => d,
            _ => {
                return Err(StorageError::Encryption(
                    "Value was not encrypted to a recipient".to_string(),
                ))
            }
        };

        let mut plaintext = Vec::new();
        decryptor
            .decrypt(std::iter::once(&self.identity as &dyn age::Identity))
            .map_err(|e| StorageError::Encryption(format!("Failed to decrypt value: {}", e)))?
            .read_to_end(&mut plaintext)?;

        Ok(plaintext)
    }
}

/// Decode a base64-encoded age identity string
pub fn decode_identity(encoded: &str) -> Result<age::x25519::Identity, StorageError> {
    use base64::{engine::general_purpose, Engine as _};

    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| StorageError::KeyStorage(format!("Invalid base64 key: {}", e)))?;
    let key = String::from_utf8(bytes)
        .map_err(|e| StorageError::KeyStorage(format!("Invalid UTF-8 in key: {}", e)))?;

    key.trim()
        .parse::<age::x25519::Identity>()
        .map_err(|e| StorageError::KeyStorage(format!("Invalid age identity: {}", e)))
}

/// Encode an age identity for [`ENCRYPTION_KEY_ENV`]
pub fn encode_identity(identity: &age::x25519::Identity) -> String {
    use base64::{engine::general_purpose, Engine as _};
    use secrecy::ExposeSecret;

    general_purpose::STANDARD.encode(identity.to_string().expose_secret().as_bytes())
}

impl PersistenceAdapter for EncryptedFilesystemStorage {
    fn get(&self, key: &str) -> StorageFuture<'_, Option<String>> {
        let full_path = self.inner.resolve_path(key);

        Box::pin(async move {
            match read_optional(&full_path).await? {
                Some(ciphertext) => utf8(self.decrypt(&ciphertext)?).map(Some),
                None => Ok(None),
            }
        })
    }

    fn set(&self, key: &str, value: &str) -> StorageFuture<'_, ()> {
        let full_path = self.inner.resolve_path(key);
        let value = value.to_string();

        Box::pin(async move {
            let ciphertext = self.encrypt(value.as_bytes())?;

            if let Some(parent) = full_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            tokio::fs::write(&full_path, ciphertext).await?;
            tracing::debug!("Wrote encrypted value to filesystem: {:?}", full_path);
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> StorageFuture<'_, ()> {
        self.inner.remove(key)
    }
}
