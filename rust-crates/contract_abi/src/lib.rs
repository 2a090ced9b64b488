//! Bindings for the deployed word chain contract and the `ethers`-backed
//! implementations of the `word_chain` gateway and event source traits.

use ethers::contract::abigen;

pub mod eth_gateway;
pub mod log_source;

pub use eth_gateway::EthGateway;
pub use log_source::LogEventSource;

abigen!(
    WordChainContract,
    r#"[
        function getLastWord(uint256 index) external view returns (string word, address author)
        function users(address account) external view returns (string name, uint8 tribe)
        function contribute(uint256 index, string word) external
        function register(string name, uint8 tribe) external
        event WordUpdated(uint256 indexed wordIndex, address indexed author)
    ]"#
);
