use crate::{
    WordChainContract,
    WordUpdatedFilter,
    eth_gateway::{
        ReadClient,
        read_error,
    },
};
use ethers::{
    contract::LogMeta,
    providers::Middleware,
    types::{
        U64,
        U256,
    },
};
use tracing::{
    debug,
    warn,
};
use word_chain::{
    Result,
    SLOT_COUNT,
    WordUpdateSource,
    WordUpdated,
};

/// Largest block span requested in one `eth_getLogs` call.
const MAX_BLOCK_RANGE: u64 = 1000;

/// Polls `WordUpdated` logs block range by block range.
pub struct LogEventSource<M = ReadClient> {
    contract: WordChainContract<M>,
    next_block: U64,
}

impl<M: Middleware> LogEventSource<M> {
    pub fn starting_at(contract: WordChainContract<M>, block: U64) -> Self {
        Self {
            contract,
            next_block: block,
        }
    }

    /// Starts at the block that is the chain head right now. Open this
    /// before the first full load so logs mined during the load are still
    /// delivered.
    pub async fn at_current_head(contract: WordChainContract<M>) -> Result<Self> {
        let head = contract
            .client()
            .get_block_number()
            .await
            .map_err(read_error)?;
        debug!(block = %head, "watching word updates from chain head");
        Ok(Self::starting_at(contract, head))
    }

    pub fn next_block(&self) -> U64 {
        self.next_block
    }
}

impl<M: Middleware + 'static> WordUpdateSource for LogEventSource<M> {
    async fn next_batch(&mut self) -> Result<Vec<WordUpdated>> {
        let latest = self
            .contract
            .client()
            .get_block_number()
            .await
            .map_err(read_error)?;
        let Some((from, to)) = block_range(self.next_block, latest) else {
            return Ok(Vec::new());
        };

        let logs = self
            .contract
            .word_updated_filter()
            .from_block(from)
            .to_block(to)
            .query_with_meta()
            .await
            .map_err(read_error)?;
        self.next_block = to + U64::one();

        Ok(logs
            .into_iter()
            .filter_map(|(event, meta)| to_update(event, &meta))
            .collect())
    }
}

/// Next inclusive range to query, capped at `MAX_BLOCK_RANGE` blocks.
fn block_range(next: U64, latest: U64) -> Option<(U64, U64)> {
    if next > latest {
        return None;
    }
    let capped = next + U64::from(MAX_BLOCK_RANGE - 1);
    Some((next, capped.min(latest)))
}

fn to_update(event: WordUpdatedFilter, meta: &LogMeta) -> Option<WordUpdated> {
    if event.word_index >= U256::from(SLOT_COUNT) {
        warn!(index = %event.word_index, "skipping update for unknown slot");
        return None;
    }
    Some(WordUpdated {
        index: event.word_index.as_usize(),
        author: event.author,
        tx_hash: meta.transaction_hash,
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use ethers::{
        providers::Provider,
        types::{
            Address,
            H256,
        },
    };
    use std::sync::Arc;

    fn meta(tx: u64) -> LogMeta {
        LogMeta {
            address: Address::zero(),
            block_number: U64::from(10),
            block_hash: H256::zero(),
            transaction_hash: H256::from_low_u64_be(tx),
            transaction_index: U64::zero(),
            log_index: U256::zero(),
        }
    }

    #[test]
    fn block_range__caps_span_and_stops_at_head() {
        assert_eq!(block_range(U64::from(5), U64::from(4)), None);
        assert_eq!(
            block_range(U64::from(5), U64::from(9)),
            Some((U64::from(5), U64::from(9)))
        );
        assert_eq!(
            block_range(U64::from(1), U64::from(5000)),
            Some((U64::from(1), U64::from(1000)))
        );
    }

    #[tokio::test]
    async fn at_current_head__starts_at_head_seen_when_opened() {
        // given
        let (provider, mock) = Provider::mocked();
        let contract = WordChainContract::new(Address::zero(), Arc::new(provider));
        mock.push(U64::from(100)).unwrap();

        // when
        let source = LogEventSource::at_current_head(contract).await.unwrap();

        // then
        assert_eq!(source.next_block(), U64::from(100));
    }

    #[tokio::test]
    async fn next_batch__covers_blocks_mined_before_first_poll() {
        // given
        let (provider, mock) = Provider::mocked();
        let contract = WordChainContract::new(Address::zero(), Arc::new(provider));
        let mut source = LogEventSource::starting_at(contract, U64::from(100));
        // responses are served last-in first-out
        mock.push::<Vec<ethers::types::Log>, _>(Vec::new()).unwrap();
        mock.push(U64::from(112)).unwrap();

        // when
        let updates = source.next_batch().await.unwrap();

        // then
        assert!(updates.is_empty());
        assert_eq!(source.next_block(), U64::from(113));
    }

    #[tokio::test]
    async fn next_batch__waits_while_chain_is_behind_start() {
        let (provider, mock) = Provider::mocked();
        let contract = WordChainContract::new(Address::zero(), Arc::new(provider));
        let mut source = LogEventSource::starting_at(contract, U64::from(101));
        mock.push(U64::from(100)).unwrap();

        let updates = source.next_batch().await.unwrap();

        assert!(updates.is_empty());
        assert_eq!(source.next_block(), U64::from(101));
    }

    #[test]
    fn to_update__carries_transaction_hash() {
        // given
        let event = WordUpdatedFilter {
            word_index: U256::from(42),
            author: Address::from_low_u64_be(3),
        };

        // when
        let update = to_update(event, &meta(77)).unwrap();

        // then
        assert_eq!(update.index, 42);
        assert_eq!(update.author, Address::from_low_u64_be(3));
        assert_eq!(update.tx_hash, H256::from_low_u64_be(77));
    }

    #[test]
    fn to_update__skips_out_of_range_slot() {
        let event = WordUpdatedFilter {
            word_index: U256::from(SLOT_COUNT),
            author: Address::zero(),
        };
        assert!(to_update(event, &meta(1)).is_none());
    }
}
