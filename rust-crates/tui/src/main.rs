use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::DeploymentEnv;
use ethers::types::Address;
use std::sync::OnceLock;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};
use word_chain::CacheConfig;
use word_chain_tui::wallets;

mod client;
mod ui;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: word-chain [--base | --sepolia | --local] [--rpc-url <url>]\n\
         [--contract <address>] [--wallet <name>] [--wallet-dir <path>]\n\
         [--config <file.json>]\n\
         \n\
         Flags:\n\
           --base               Connect to Base mainnet (default RPC {})\n\
           --sepolia            Connect to Base Sepolia (default RPC {})\n\
           --local              Connect to a local node (default RPC {})\n\
           --rpc-url <url>      Override the RPC URL for the selected network\n\
           --contract <address> Word chain contract; recorded as the current deployment\n\
           --wallet <name>      Keystore file to sign with; omit to browse read-only\n\
           --wallet-dir <path>  Override the keystore directory (defaults to ~/.ethereum/keystore)\n\
           --config <file>      JSON file overriding cache and timing settings",
        DeploymentEnv::Base.default_rpc_url(),
        DeploymentEnv::Sepolia.default_rpc_url(),
        DeploymentEnv::Local.default_rpc_url(),
    );
    std::process::exit(0);
}

fn parse_cli_args(mut args: impl Iterator<Item = String>) -> Result<client::AppConfig> {
    let mut network_env: Option<DeploymentEnv> = None;
    let mut custom_url: Option<String> = None;
    let mut contract: Option<Address> = None;
    let mut wallet_dir: Option<String> = None;
    let mut wallet_name: Option<String> = None;
    let mut config_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            flag @ ("--base" | "--sepolia" | "--local") => {
                if network_env.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --base/--sepolia/--local"
                    ));
                }
                network_env = Some(match flag {
                    "--base" => DeploymentEnv::Base,
                    "--sepolia" => DeploymentEnv::Sepolia,
                    _ => DeploymentEnv::Local,
                });
            }
            "--rpc-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--rpc-url requires a URL argument"))?;
                if custom_url.is_some() {
                    return Err(eyre!("--rpc-url may only be specified once"));
                }
                if network_env.is_none() {
                    return Err(eyre!(
                        "--rpc-url must follow a network flag (--base/--sepolia/--local)"
                    ));
                }
                custom_url = Some(url);
            }
            "--contract" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--contract requires an address argument"))?;
                if contract.is_some() {
                    return Err(eyre!("--contract may only be specified once"));
                }
                let address = raw
                    .parse::<Address>()
                    .map_err(|_| eyre!("Invalid contract address: {raw}"))?;
                contract = Some(address);
            }
            "--wallet-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet-dir requires a path argument"))?;
                if wallet_dir.is_some() {
                    return Err(eyre!("--wallet-dir may only be specified once"));
                }
                wallet_dir = Some(dir);
            }
            "--wallet" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet requires a wallet name"))?;
                if wallet_name.is_some() {
                    return Err(eyre!("--wallet may only be specified once"));
                }
                wallet_name = Some(name);
            }
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| eyre!("--config requires a file path"))?;
                if config_path.is_some() {
                    return Err(eyre!("--config may only be specified once"));
                }
                config_path = Some(path);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let env = network_env
        .ok_or_else(|| eyre!("Select a network with --base, --sepolia, or --local"))?;
    let network = client::NetworkTarget::new(env, custom_url);

    let wallet = match wallet_name {
        Some(name) => client::WalletConfig::Keystore {
            name,
            dir: wallets::resolve_wallet_dir(wallet_dir.as_deref())?,
        },
        None if wallet_dir.is_some() => {
            return Err(eyre!("--wallet-dir needs --wallet <name>"));
        }
        None => client::WalletConfig::ReadOnly,
    };

    let cache = match config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .wrap_err_with(|| format!("Failed to read config file {path}"))?;
            CacheConfig::from_json(&raw)
                .wrap_err_with(|| format!("Failed to parse config file {path}"))?
        }
        None => CacheConfig::default(),
    };

    Ok(client::AppConfig {
        network,
        contract,
        wallet,
        cache,
    })
}

/// Logs go to a daily file; the terminal belongs to the UI.
fn init_tracing() {
    let appender = rolling::daily("logs", "word-chain.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    if installed.is_ok() {
        let _ = LOG_GUARD.set(guard);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();
    tracing::info!("starting word-chain client");
    deployments::ensure_structure().map_err(|e| eyre!(e))?;
    let app_config = parse_cli_args(std::env::args().skip(1))?;
    client::run_app(app_config).await
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use std::time::Duration;
    use tempdir::TempDir;

    fn args(raw: &[&str]) -> impl Iterator<Item = String> {
        raw.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn parse_cli_args__defaults_to_read_only_on_network_url() {
        // when
        let config = parse_cli_args(args(&["--sepolia"])).unwrap();

        // then
        assert_eq!(config.network.env, DeploymentEnv::Sepolia);
        assert_eq!(config.network.url, "https://sepolia.base.org");
        assert_eq!(config.wallet, client::WalletConfig::ReadOnly);
        assert_eq!(config.contract, None);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn parse_cli_args__accepts_rpc_override_and_contract() {
        // when
        let config = parse_cli_args(args(&[
            "--local",
            "--rpc-url",
            "http://node:8545",
            "--contract",
            "0xf8e81D47203A594245E36C48e151709F0C19fBe8",
        ]))
        .unwrap();

        // then
        assert_eq!(config.network.url, "http://node:8545");
        assert_eq!(
            config.contract,
            Some("0xf8e81D47203A594245E36C48e151709F0C19fBe8".parse().unwrap())
        );
    }

    #[test]
    fn parse_cli_args__requires_exactly_one_network() {
        let missing = parse_cli_args(args(&[])).unwrap_err();
        assert!(missing.to_string().contains("Select a network"));

        let twice = parse_cli_args(args(&["--base", "--local"])).unwrap_err();
        assert!(twice.to_string().contains("Multiple network flags"));
    }

    #[test]
    fn parse_cli_args__rpc_url_must_follow_network() {
        let err = parse_cli_args(args(&["--rpc-url", "http://x", "--base"])).unwrap_err();
        assert!(err.to_string().contains("must follow a network flag"));
    }

    #[test]
    fn parse_cli_args__rejects_bad_input() {
        let unknown = parse_cli_args(args(&["--base", "--fast"])).unwrap_err();
        assert_eq!(unknown.to_string(), "Unknown argument: --fast");

        let address = parse_cli_args(args(&["--base", "--contract", "0x12"])).unwrap_err();
        assert!(address.to_string().contains("Invalid contract address"));

        let repeated =
            parse_cli_args(args(&["--base", "--wallet", "a", "--wallet", "b"])).unwrap_err();
        assert_eq!(repeated.to_string(), "--wallet may only be specified once");
    }

    #[test]
    fn parse_cli_args__keystore_wallet_uses_given_dir() {
        let config = parse_cli_args(args(&[
            "--base",
            "--wallet",
            "alice",
            "--wallet-dir",
            "/tmp/keys",
        ]))
        .unwrap();
        assert_eq!(
            config.wallet,
            client::WalletConfig::Keystore {
                name: String::from("alice"),
                dir: "/tmp/keys".into(),
            }
        );
    }

    #[test]
    fn parse_cli_args__loads_cache_config_file() {
        // given
        let dir = TempDir::new("word-chain-config").unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "event_batch_size": 3, "status_ttl": 8000 }"#).unwrap();

        // when
        let config = parse_cli_args(args(&[
            "--local",
            "--config",
            path.to_str().unwrap(),
        ]))
        .unwrap();

        // then
        assert_eq!(config.cache.event_batch_size, 3);
        assert_eq!(config.cache.status_ttl, Duration::from_secs(8));
        assert_eq!(config.cache.load_batch_size, 10);
    }
}
