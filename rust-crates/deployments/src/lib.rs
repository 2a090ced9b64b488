use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Base,
    Sepolia,
    Local,
}

impl DeploymentEnv {
    pub const ALL: [DeploymentEnv; 3] = [
        DeploymentEnv::Base,
        DeploymentEnv::Sepolia,
        DeploymentEnv::Local,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Base => "base",
            DeploymentEnv::Sepolia => "sepolia",
            DeploymentEnv::Local => "local",
        }
    }

    pub fn chain_id(self) -> u64 {
        match self {
            DeploymentEnv::Base => 8453,
            DeploymentEnv::Sepolia => 84532,
            DeploymentEnv::Local => 31337,
        }
    }

    pub fn default_rpc_url(self) -> &'static str {
        match self {
            DeploymentEnv::Base => "https://base-rpc.publicnode.com",
            DeploymentEnv::Sepolia => "https://sepolia.base.org",
            DeploymentEnv::Local => "http://localhost:8545",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Base => "Base",
            DeploymentEnv::Sepolia => "Base Sepolia",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub recorded_at: String,
    pub contract_address: String,
    pub network_url: String,
    pub chain_id: u64,
}

impl DeploymentRecord {
    pub fn new(
        env: DeploymentEnv,
        contract_address: impl AsRef<str>,
        network_url: impl AsRef<str>,
    ) -> Self {
        Self {
            recorded_at: Utc::now().to_rfc3339(),
            contract_address: contract_address.as_ref().to_string(),
            network_url: network_url.as_ref().to_string(),
            chain_id: env.chain_id(),
        }
    }

    pub fn is_for(&self, env: DeploymentEnv) -> bool {
        self.chain_id == env.chain_id()
    }
}

/// `deployments.json` for one network. The file holds every record seen so
/// far; the last one is the current deployment.
#[derive(Debug)]
pub struct DeploymentStore {
    env: DeploymentEnv,
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::with_root(DEPLOYMENTS_ROOT, env)
    }

    pub fn with_root(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { env, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest record for this network, if any.
    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        let records = read_records(&self.path)?;
        Ok(records.into_iter().rev().find(|record| record.is_for(self.env)))
    }

    pub fn save(&self, record: DeploymentRecord) -> Result<()> {
        if !record.is_for(self.env) {
            return Err(anyhow!(
                "Refusing to store a chain {} deployment under {}",
                record.chain_id,
                self.env
            ));
        }
        let mut records = read_records(&self.path)?;
        if records.last() == Some(&record) {
            return Ok(());
        }
        records.push(record);
        write_records(&self.path, &records)
    }
}

pub fn ensure_structure() -> Result<()> {
    for env in DeploymentEnv::ALL {
        let _ = ensure_store(Path::new(DEPLOYMENTS_ROOT), env)?;
    }
    Ok(())
}

/// Appends `contract_address` as the current deployment for `env`, unless
/// it already is.
pub fn record_deployment(
    env: DeploymentEnv,
    contract_address: impl AsRef<str>,
    network_url: impl AsRef<str>,
) -> Result<()> {
    let store = DeploymentStore::new(env)?;
    let contract_address = contract_address.as_ref();
    if store
        .load()?
        .is_some_and(|current| current.contract_address.eq_ignore_ascii_case(contract_address))
    {
        return Ok(());
    }
    store.save(DeploymentRecord::new(env, contract_address, network_url))
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!(
                "Failed to create {}/{} directory",
                root.display(),
                env.dir_name()
            )
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        fs::write(&file_path, b"").with_context(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
    }

    Ok(file_path)
}

/// Accepts either a single record or an array of records.
fn read_records(path: impl AsRef<Path>) -> Result<Vec<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    if let Ok(records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(vec![record]);
    }
    Err(anyhow!(
        "Failed to parse deployment record JSON; expected a deployment object or a list of them"
    ))
}

fn write_records(path: impl AsRef<Path>, records: &[DeploymentRecord]) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)
        .context("Failed to serialize deployment records")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment records")?;
    Ok(())
}
