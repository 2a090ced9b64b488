use crate::WordChainContract;
use ethers::{
    middleware::SignerMiddleware,
    providers::{
        Http,
        Middleware,
        PendingTransaction,
        Provider,
    },
    signers::{
        LocalWallet,
        Signer,
    },
    types::{
        Address,
        TxHash,
        U64,
        U256,
    },
};
use std::{
    fmt::Display,
    sync::Arc,
    time::Duration,
};
use tracing::{
    info,
    warn,
};
use word_chain::{
    Error,
    Result,
    Tribe,
    WordChainGateway,
};

pub type ReadClient = Provider<Http>;
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
/// Blocks a receipt must be buried under before a write counts as confirmed.
const CONFIRMATIONS: usize = 1;

pub struct EthGateway {
    reader: WordChainContract<ReadClient>,
    writer: Option<WordChainContract<SignerClient>>,
    account: Option<Address>,
}

impl EthGateway {
    /// Connects to `rpc_url` and binds the contract at `contract`. The RPC
    /// must report `expected_chain_id`. Without a wallet the gateway is
    /// read-only.
    pub async fn connect(
        rpc_url: &str,
        contract: Address,
        expected_chain_id: u64,
        wallet: Option<LocalWallet>,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|err| Error::Read(format!("invalid RPC url {rpc_url}: {err}")))?
            .interval(RECEIPT_POLL_INTERVAL);
        let chain_id = provider.get_chainid().await.map_err(read_error)?.as_u64();
        check_chain_id(expected_chain_id, chain_id)?;

        let reader = WordChainContract::new(contract, Arc::new(provider.clone()));
        let (writer, account) = match wallet {
            Some(wallet) => {
                let wallet = wallet.with_chain_id(chain_id);
                let account = wallet.address();
                let client = SignerMiddleware::new(provider, wallet);
                (
                    Some(WordChainContract::new(contract, Arc::new(client))),
                    Some(account),
                )
            }
            None => (None, None),
        };
        info!(
            chain_id,
            contract = ?contract,
            account = ?account,
            "connected to word chain contract"
        );

        Ok(Self {
            reader,
            writer,
            account,
        })
    }

    /// Read-only handle on the contract, shared with the log source.
    pub fn reader(&self) -> &WordChainContract<ReadClient> {
        &self.reader
    }

    fn writer(&self) -> Result<&WordChainContract<SignerClient>> {
        self.writer.as_ref().ok_or(Error::ReadOnly)
    }
}

impl WordChainGateway for EthGateway {
    fn account(&self) -> Option<Address> {
        self.account
    }

    fn disconnect(&mut self) {
        self.writer = None;
        self.account = None;
    }

    async fn last_word(&self, index: usize) -> Result<(String, Option<Address>)> {
        let (word, author) = self
            .reader
            .get_last_word(U256::from(index))
            .call()
            .await
            .map_err(read_error)?;
        Ok((word, known_author(author)))
    }

    async fn user(&self, address: Address) -> Result<(String, Tribe)> {
        let (name, tribe_id) = self.reader.users(address).call().await.map_err(read_error)?;
        let tribe = Tribe::try_from(tribe_id).unwrap_or_else(|unknown| {
            warn!(unknown, ?address, "contract returned unknown tribe id");
            Tribe::default()
        });
        Ok((name, tribe))
    }

    async fn submit_contribution(&self, index: usize, word: &str) -> Result<TxHash> {
        let call = self.writer()?.contribute(U256::from(index), word.to_string());
        let pending = call.send().await.map_err(write_error)?;
        Ok(pending.tx_hash())
    }

    async fn submit_registration(&self, name: &str, tribe: Tribe) -> Result<TxHash> {
        let call = self.writer()?.register(name.to_string(), tribe.id());
        let pending = call.send().await.map_err(write_error)?;
        Ok(pending.tx_hash())
    }

    async fn await_confirmation(&self, tx_hash: TxHash) -> Result<()> {
        let client = self.reader.client();
        let receipt = PendingTransaction::new(tx_hash, &client)
            .interval(RECEIPT_POLL_INTERVAL)
            .confirmations(CONFIRMATIONS)
            .await
            .map_err(write_error)?;
        match receipt {
            None => Err(Error::Transaction(String::from(
                "transaction dropped from mempool",
            ))),
            Some(receipt) if receipt.status == Some(U64::zero()) => {
                Err(Error::Transaction(String::from("execution reverted")))
            }
            Some(_) => Ok(()),
        }
    }
}

fn check_chain_id(expected: u64, actual: u64) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::ChainMismatch { expected, actual })
    }
}

/// The contract returns the zero address for a slot nobody wrote.
pub(crate) fn known_author(author: Address) -> Option<Address> {
    (!author.is_zero()).then_some(author)
}

pub(crate) fn read_error(err: impl Display) -> Error {
    Error::Read(err.to_string())
}

fn write_error(err: impl Display) -> Error {
    Error::from_write_failure(err.to_string())
}
