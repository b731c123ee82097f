//! Transaction signing adapters.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use solana_sdk::signature::{Keypair, Signer};
use tracing::info;

/// Seam for transaction signing. The live executor only needs a public key
/// and a signature over raw transaction bytes.
pub trait TxnSigner: Send + Sync {
    fn pubkey_base58(&self) -> String;
    fn sign_transaction(&self, txn_bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Local ed25519 keypair signer.
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    /// Load a base58-encoded secret key from an environment variable.
    pub fn from_env(var: &str) -> Result<Self> {
        let secret = std::env::var(var)
            .with_context(|| format!("environment variable {var} not set"))?;
        Self::from_base58(secret.trim())
    }

    /// Parse a base58-encoded 64-byte secret key.
    pub fn from_base58(secret: &str) -> Result<Self> {
        let bytes = bs58::decode(secret)
            .into_vec()
            .context("invalid base58 secret key")?;
        Self::from_key_bytes(&bytes)
    }

    /// Load a keypair from a solana-keygen style JSON byte-array file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read keypair file {}", path.display()))?;
        let bytes: Vec<u8> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid keypair file {}", path.display()))?;
        Self::from_key_bytes(&bytes)
    }

    fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 64 {
            bail!("invalid secret key length: {} bytes (expected 64)", bytes.len());
        }
        let keypair =
            Keypair::from_bytes(bytes).map_err(|e| anyhow!("invalid keypair bytes: {e}"))?;
        let signer = Self { keypair };
        info!(pubkey = %signer.pubkey_base58(), "loaded signing keypair");
        Ok(signer)
    }
}

impl TxnSigner for KeypairSigner {
    fn pubkey_base58(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    /// Sign the transaction message and prepend the 64-byte signature.
    fn sign_transaction(&self, txn_bytes: &[u8]) -> Result<Vec<u8>> {
        let signature = self.keypair.sign_message(txn_bytes);
        let mut signed = Vec::with_capacity(64 + txn_bytes.len());
        signed.extend_from_slice(signature.as_ref());
        signed.extend_from_slice(txn_bytes);
        Ok(signed)
    }
}
