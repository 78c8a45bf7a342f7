//! Secret storage in a file protected by a user-scoped OS primitive.
//!
//! The file holds the protected bytes of the UTF-8 secret with no header, at
//! `<data dir>/<instance>/keystore.bin`. On Windows the protector is DPAPI,
//! which binds the bytes to the current user account and machine.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use zeroize::Zeroizing;

use super::SecretStore;
use crate::fs::{rename_replacing, set_owner_only, sibling_path};

const KEYSTORE_FILE: &str = "keystore.bin";

/// Why protected bytes could not be turned back into plaintext.
#[derive(Debug, Error)]
pub enum ProtectError {
    /// Written by a different user or machine: the secret exists but is not
    /// available to this account.
    #[error("protected data belongs to another user or machine: {0}")]
    WrongScope(String),

    /// The bytes are damaged.
    #[error("protected data is corrupt: {0}")]
    Corrupt(String),

    /// The protection primitive itself failed.
    #[error("data protection failed: {0}")]
    Failed(String),
}

/// Classify a `CryptUnprotectData` failure code.
#[cfg_attr(not(windows), allow(dead_code))]
fn unprotect_error(code: u32) -> ProtectError {
    const ERROR_INVALID_DATA: u32 = 13;
    // The master key belongs to another user or machine.
    const NTE_BAD_KEY_STATE: u32 = 0x8009_000B;

    let detail = format!("CryptUnprotectData error {:#x}", code);
    match code {
        ERROR_INVALID_DATA => ProtectError::Corrupt(detail),
        NTE_BAD_KEY_STATE => ProtectError::WrongScope(detail),
        _ => ProtectError::Failed(detail),
    }
}

/// User-scoped encryption primitive.
pub trait DataProtector: Send + Sync {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtectError>;
    fn unprotect(&self, protected: &[u8]) -> Result<Zeroizing<Vec<u8>>, ProtectError>;
}

pub struct ProtectedFileStore<P> {
    protector: P,
    path: PathBuf,
}

impl<P: DataProtector> ProtectedFileStore<P> {
    pub fn new(protector: P, data_dir: &Path, instance: &str) -> Self {
        Self {
            protector,
            path: data_dir.join(instance).join(KEYSTORE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = sibling_path(&self.path, ".tmp");
        fs::write(&temp, bytes)?;
        set_owner_only(&temp)?;
        rename_replacing(&temp, &self.path).map_err(|err| {
            let _ = fs::remove_file(&temp);
            err
        })
    }
}

impl<P: DataProtector> SecretStore for ProtectedFileStore<P> {
    fn store_key(&self, secret: &str, label: &str) -> bool {
        let protected = match self.protector.protect(secret.as_bytes()) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "could not protect secret");
                return false;
            }
        };
        match self.write_atomically(&protected) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), label, "secret stored");
                true
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "could not write keystore");
                false
            }
        }
    }

    fn retrieve_key(&self) -> Option<String> {
        let protected = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "could not read keystore");
                return None;
            }
        };

        let plaintext = match self.protector.unprotect(&protected) {
            Ok(bytes) => bytes,
            Err(ProtectError::WrongScope(reason)) => {
                tracing::info!(%reason, "stored secret is not available to this account");
                return None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "stored secret could not be read");
                return None;
            }
        };

        match std::str::from_utf8(&plaintext) {
            Ok(secret) if !secret.is_empty() => Some(secret.to_string()),
            Ok(_) => None,
            Err(_) => {
                tracing::warn!("stored secret is not valid UTF-8");
                None
            }
        }
    }

    fn remove_key(&self) -> bool {
        match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(err) if err.kind() == io::ErrorKind::NotFound => true,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "could not remove keystore");
                false
            }
        }
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "protected-file"
    }
}

#[cfg(windows)]
pub use dpapi::DpapiProtector;

#[cfg(windows)]
mod dpapi {
    use std::ptr;

    use windows_sys::Win32::Foundation::{GetLastError, LocalFree};
    use windows_sys::Win32::Security::Cryptography::{
        CryptProtectData, CryptUnprotectData, CRYPTPROTECT_UI_FORBIDDEN, CRYPT_INTEGER_BLOB,
    };
    use zeroize::Zeroizing;

    use super::{unprotect_error, DataProtector, ProtectError};

    /// DPAPI bound to the current user, with the instance name mixed in as
    /// additional entropy.
    pub struct DpapiProtector {
        entropy: Vec<u8>,
    }

    impl DpapiProtector {
        pub fn new(instance: &str) -> Self {
            Self {
                entropy: instance.as_bytes().to_vec(),
            }
        }

        fn entropy_blob(&self) -> CRYPT_INTEGER_BLOB {
            CRYPT_INTEGER_BLOB {
                cbData: self.entropy.len() as u32,
                pbData: self.entropy.as_ptr() as *mut u8,
            }
        }
    }

    fn input_blob(bytes: &[u8]) -> Result<CRYPT_INTEGER_BLOB, ProtectError> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| ProtectError::Failed("input too large".to_string()))?;
        Ok(CRYPT_INTEGER_BLOB {
            cbData: len,
            pbData: bytes.as_ptr() as *mut u8,
        })
    }

    /// Copy a DPAPI output blob and release the OS allocation.
    ///
    /// # Safety
    ///
    /// `blob` must have been filled in by a successful DPAPI call.
    unsafe fn take_blob(blob: CRYPT_INTEGER_BLOB) -> Vec<u8> {
        let bytes = std::slice::from_raw_parts(blob.pbData, blob.cbData as usize).to_vec();
        LocalFree(blob.pbData as _);
        bytes
    }

    impl DataProtector for DpapiProtector {
        fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtectError> {
            let input = input_blob(plaintext)?;
            let entropy = self.entropy_blob();
            let mut output = CRYPT_INTEGER_BLOB {
                cbData: 0,
                pbData: ptr::null_mut(),
            };
            // SAFETY: all blobs point at live buffers for the duration of the
            // call; the output is released by take_blob.
            let ok = unsafe {
                CryptProtectData(
                    &input,
                    ptr::null(),
                    &entropy,
                    ptr::null(),
                    ptr::null(),
                    CRYPTPROTECT_UI_FORBIDDEN,
                    &mut output,
                )
            };
            if ok == 0 {
                let code = unsafe { GetLastError() };
                return Err(ProtectError::Failed(format!("CryptProtectData error {}", code)));
            }
            Ok(unsafe { take_blob(output) })
        }

        fn unprotect(&self, protected: &[u8]) -> Result<Zeroizing<Vec<u8>>, ProtectError> {
            let input = input_blob(protected)?;
            let entropy = self.entropy_blob();
            let mut output = CRYPT_INTEGER_BLOB {
                cbData: 0,
                pbData: ptr::null_mut(),
            };
            // SAFETY: as in protect.
            let ok = unsafe {
                CryptUnprotectData(
                    &input,
                    ptr::null_mut(),
                    &entropy,
                    ptr::null(),
                    ptr::null(),
                    CRYPTPROTECT_UI_FORBIDDEN,
                    &mut output,
                )
            };
            if ok == 0 {
                let code = unsafe { GetLastError() };
                return Err(unprotect_error(code));
            }
            Ok(Zeroizing::new(unsafe { take_blob(output) }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// XOR "protection" tagged with the owning account, so a file written
    /// under one account is detectably unreadable under another.
    struct AccountProtector {
        account: u8,
    }

    impl DataProtector for AccountProtector {
        fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtectError> {
            let mut out = vec![self.account];
            out.extend(plaintext.iter().map(|b| b ^ 0x5a));
            Ok(out)
        }

        fn unprotect(&self, protected: &[u8]) -> Result<Zeroizing<Vec<u8>>, ProtectError> {
            match protected.split_first() {
                Some((owner, body)) if *owner == self.account => {
                    Ok(Zeroizing::new(body.iter().map(|b| b ^ 0x5a).collect()))
                }
                Some(_) => Err(ProtectError::WrongScope("other account".to_string())),
                None => Err(ProtectError::Corrupt("empty".to_string())),
            }
        }
    }

    fn store(dir: &Path, account: u8, instance: &str) -> ProtectedFileStore<AccountProtector> {
        ProtectedFileStore::new(AccountProtector { account }, dir, instance)
    }

    #[test]
    fn test_store_retrieve_remove() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 1, "rentals");

        assert_eq!(store.retrieve_key(), None);
        assert!(store.store_key("Correct123!Pass", "label"));
        assert_eq!(store.retrieve_key().as_deref(), Some("Correct123!Pass"));

        let on_disk = fs::read(store.path()).unwrap();
        assert!(!String::from_utf8_lossy(&on_disk).contains("Correct123!Pass"));

        assert!(store.remove_key());
        assert!(store.remove_key());
        assert_eq!(store.retrieve_key(), None);
    }

    #[test]
    fn test_store_overwrites_previous_secret() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 1, "rentals");

        assert!(store.store_key("First123!Secret", "label"));
        assert!(store.store_key("Second123!Secret", "label"));
        assert_eq!(store.retrieve_key().as_deref(), Some("Second123!Secret"));
    }

    #[test]
    fn test_other_account_sees_nothing() {
        let dir = tempdir().unwrap();
        assert!(store(dir.path(), 1, "rentals").store_key("Correct123!Pass", "label"));

        assert_eq!(store(dir.path(), 2, "rentals").retrieve_key(), None);
    }

    #[test]
    fn test_corrupt_file_reads_as_absent() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 1, "rentals");
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"").unwrap();

        assert_eq!(store.retrieve_key(), None);
    }

    #[test]
    fn test_unprotect_error_codes() {
        assert!(matches!(unprotect_error(13), ProtectError::Corrupt(_)));
        assert!(matches!(unprotect_error(0x8009_000B), ProtectError::WrongScope(_)));
        // ERROR_ACCESS_DENIED is a real failure, not someone else's secret.
        assert!(matches!(unprotect_error(5), ProtectError::Failed(_)));
    }

    #[test]
    fn test_instances_do_not_collide() {
        let dir = tempdir().unwrap();
        let east = store(dir.path(), 1, "rentals-east");
        let west = store(dir.path(), 1, "rentals-west");

        assert!(east.store_key("East123!Secret", "label"));
        assert_eq!(west.retrieve_key(), None);
        assert!(west.store_key("West123!Secret", "label"));
        assert_eq!(east.retrieve_key().as_deref(), Some("East123!Secret"));
    }
}
