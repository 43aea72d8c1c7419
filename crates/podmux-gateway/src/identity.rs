// SPDX-License-Identifier: Apache-2.0

//! Ed25519 server identity, materialized once per data directory.
//!
//! Same secret-file-mode discipline as the bearer token in `auth`, applied
//! to the identity's own invariants: private key 0600, public key 0644,
//! directory 0700 (see DESIGN.md for the `ed25519-dalek` choice).

use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::Engine;
use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Load the identity from `data_dir`, generating and persisting a new
    /// keypair if none exists yet.
    pub fn load_or_generate(data_dir: &Path) -> anyhow::Result<Self> {
        ensure_dir_mode_0700(data_dir)?;
        let private_path = data_dir.join("identity.key");
        let public_path = data_dir.join("identity.pub");

        if private_path.is_file() {
            let bytes = std::fs::read(&private_path)
                .with_context(|| format!("reading {}", private_path.display()))?;
            let key_bytes: [u8; 32] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("identity key file is not 32 bytes"))?;
            return Ok(Self {
                signing_key: SigningKey::from_bytes(&key_bytes),
            });
        }

        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        write_secret_file(&private_path, signing_key.to_bytes().as_slice(), 0o600)?;
        write_secret_file(
            &public_path,
            signing_key.verifying_key().to_bytes().as_slice(),
            0o644,
        )?;
        Ok(Self { signing_key })
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// `sha256:<base64url(sha256(raw public key))>`.
    pub fn fingerprint(&self) -> String {
        let raw = self.verifying_key().to_bytes();
        let digest = Sha256::digest(raw);
        format!(
            "sha256:{}",
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
        )
    }
}

fn ensure_dir_mode_0700(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("setting mode on {}", dir.display()))?;
    }
    Ok(())
}

fn write_secret_file(path: &PathBuf, data: &[u8], #[allow(unused_variables)] mode: u32) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(path)
            .with_context(|| format!("writing {}", path.display()))?;
        f.write_all(data)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_reloads_the_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let first = Identity::load_or_generate(dir.path()).unwrap();
        let second = Identity::load_or_generate(dir.path()).unwrap();
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_has_sha256_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let identity = Identity::load_or_generate(dir.path()).unwrap();
        assert!(identity.fingerprint().starts_with("sha256:"));
    }

    #[cfg(unix)]
    #[test]
    fn private_key_file_is_mode_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        Identity::load_or_generate(dir.path()).unwrap();
        let meta = std::fs::metadata(dir.path().join("identity.key")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn public_key_file_is_mode_0644() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        Identity::load_or_generate(dir.path()).unwrap();
        let meta = std::fs::metadata(dir.path().join("identity.pub")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn data_dir_is_mode_0700() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("nested");
        Identity::load_or_generate(&sub).unwrap();
        let meta = std::fs::metadata(&sub).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o700);
    }
}
