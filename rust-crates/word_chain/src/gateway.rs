use crate::{
    Result,
    types::Tribe,
};
use ethers::types::{
    Address,
    TxHash,
};

/// Reads and writes against the word chain contract.
///
/// Writes are split in two: `submit_*` returns as soon as the transaction is
/// broadcast, `await_confirmation` resolves once it is mined successfully.
pub trait WordChainGateway {
    /// Signing account, `None` when the gateway is read-only.
    fn account(&self) -> Option<Address>;

    /// Forgets the signing account; later writes fail with `Error::ReadOnly`.
    fn disconnect(&mut self);

    /// `getLastWord(index)`; an unset author comes back as `None`.
    fn last_word(
        &self,
        index: usize,
    ) -> impl Future<Output = Result<(String, Option<Address>)>>;

    /// `users(address)`
    fn user(&self, address: Address) -> impl Future<Output = Result<(String, Tribe)>>;

    fn submit_contribution(
        &self,
        index: usize,
        word: &str,
    ) -> impl Future<Output = Result<TxHash>>;

    fn submit_registration(
        &self,
        name: &str,
        tribe: Tribe,
    ) -> impl Future<Output = Result<TxHash>>;

    fn await_confirmation(&self, tx_hash: TxHash) -> impl Future<Output = Result<()>>;
}
