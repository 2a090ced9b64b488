use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use ethers::signers::{
    LocalWallet,
    Signer,
};
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".ethereum").join("keystore"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

/// Keystore files in `dir`, named by file stem. Hidden files are skipped.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read keystore directory")? {
        let entry = entry.wrap_err("Failed to read keystore entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid keystore filename {:?}", path))?
            .to_owned();
        if name.starts_with('.') {
            continue;
        }
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

/// Prompts for the keystore password and decrypts the signing key.
pub fn unlock_wallet(descriptor: &WalletDescriptor, chain_id: u64) -> Result<LocalWallet> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read wallet password")?;
    unlock_with_password(descriptor, &password, chain_id)
}

pub fn unlock_with_password(
    descriptor: &WalletDescriptor,
    password: &str,
    chain_id: u64,
) -> Result<LocalWallet> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;
    let wallet = LocalWallet::from_bytes(&secret).map_err(|_| {
        eyre!(
            "Wallet '{}' contained unsupported key material",
            descriptor.name
        )
    })?;
    Ok(wallet.with_chain_id(chain_id))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn list_wallets__names_keystores_by_stem() {
        // given
        let dir = TempDir::new("keystore").unwrap();
        fs::write(dir.path().join("bob.json"), b"{}").unwrap();
        fs::write(dir.path().join("alice"), b"{}").unwrap();
        fs::write(dir.path().join(".DS_Store"), b"").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        // when
        let wallets = list_wallets(dir.path()).unwrap();

        // then
        let names: Vec<_> = wallets.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn list_wallets__missing_dir_is_empty() {
        let dir = TempDir::new("keystore").unwrap();
        let wallets = list_wallets(&dir.path().join("absent")).unwrap();
        assert!(wallets.is_empty());
    }

    #[test]
    fn find_wallet__reports_unknown_name() {
        let dir = TempDir::new("keystore").unwrap();
        let err = find_wallet(dir.path(), "carol").unwrap_err();
        assert!(err.to_string().contains("Wallet 'carol' not found"));
    }

    #[test]
    fn unlock_with_password__rejects_unreadable_keystore() {
        // given
        let dir = TempDir::new("keystore").unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, b"not a keystore").unwrap();
        let descriptor = WalletDescriptor::new("broken", path);

        // when
        let result = unlock_with_password(&descriptor, "secret", 8453);

        // then
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Invalid password for wallet 'broken'"));
    }

    #[test]
    fn resolve_wallet_dir__expands_home() {
        let home = std::env::var("HOME").unwrap();
        let dir = resolve_wallet_dir(Some("~/keys")).unwrap();
        assert_eq!(dir, PathBuf::from(home).join("keys"));
    }
}
