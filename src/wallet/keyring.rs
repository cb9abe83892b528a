use crate::error::Result;
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Node key store with one active address.
///
/// The active wallet signs outgoing transactions and collects mining
/// rewards. Creating a new address rotates the active wallet; old keys are
/// kept so previously earned balances stay spendable.
pub struct Keyring {
    path: PathBuf,
    state: KeyringState,
}

#[derive(Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
struct KeyringState {
    wallets: HashMap<String, Wallet>,
    active: String,
}

impl Keyring {
    /// Load the keyring from disk, creating a first wallet when the file
    /// does not exist yet.
    pub fn open(path: &Path) -> Result<Keyring> {
        let mut keyring = Keyring {
            path: path.to_path_buf(),
            state: KeyringState::default(),
        };
        keyring.load_from_file();
        if keyring.state.wallets.is_empty() {
            keyring.new_address()?;
        }
        Ok(keyring)
    }

    /// Create a wallet, make it the active one, and persist
    pub fn new_address(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.state.wallets.insert(address.clone(), wallet);
        self.state.active = address.clone();
        self.save_to_file();
        Ok(address)
    }

    pub fn active_address(&self) -> &str {
        self.state.active.as_str()
    }

    pub fn active_wallet(&self) -> Option<&Wallet> {
        self.state.wallets.get(self.state.active.as_str())
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.state.wallets.get(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.state.wallets.keys().cloned().collect()
    }

    fn load_from_file(&mut self) {
        // a missing or unreadable file just means a fresh keyring
        if let Err(e) = self.load_from_file_safe() {
            log::warn!("Could not load keyring from file: {e}");
        }
    }

    fn load_from_file_safe(&mut self) -> std::result::Result<(), Box<dyn std::error::Error>> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut file = File::open(&self.path)?;
        let metadata = file.metadata()?;
        let mut buf = vec![0; metadata.len() as usize];
        file.read_exact(&mut buf)?;
        self.state = deserialize(&buf[..])?;
        Ok(())
    }

    fn save_to_file(&self) {
        if let Err(e) = self.save_to_file_safe() {
            log::error!("Could not save keyring to file: {e}");
        }
    }

    fn save_to_file_safe(&self) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let bytes = serialize(&self.state)?;
        writer.write_all(bytes.as_slice())?;
        writer.flush()?;
        Ok(())
    }
}
