//! [`Ledger`] backed by the poker contract on an EVM JSON-RPC node.

use crate::ledger::{Confirmation, EventCursor, Ledger, LedgerCall, LedgerError};
use crate::{Error, Result};
use ethers::abi::RawLog;
use ethers::contract::{abigen, ContractCall, ContractError, EthLogDecode};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, MiddlewareError, Provider, RpcError};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{H160, U256, U64};
use holdem_types::{Address, GameEnded, GameId, GameState, Stage, Wei};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

abigen!(
    PokerContract,
    r#"[
        event GameCreated(uint256 indexed gameId, address indexed dealer, uint256 buyIn)
        event GameEnded(uint256 indexed gameId, address winner, uint256 winningAmount)
        function createGame(uint256 buyIn) external
        function joinGame(uint256 gameId) external payable
        function startGame(uint256 gameId) external
        function bet(uint256 gameId, uint256 amount) external
        function call(uint256 gameId) external
        function fold(uint256 gameId) external
        function getCommunityCards(uint256 gameId) external view returns (uint8[])
        function getPlayerCards(uint256 gameId, address player) external view returns (uint8[])
        function getGameState(uint256 gameId) external view returns (uint8, address, uint256, address[])
        function getLastID() external view returns (uint256)
    ]"#
);

/// Gas limit used when none is configured (matches a local dev node).
pub const DEFAULT_GAS_LIMIT: u64 = 2_000_000;

/// Gas price used when none is configured, in gwei.
pub const DEFAULT_GAS_PRICE_GWEI: u64 = 20;

const GWEI: u64 = 1_000_000_000;

type SignedClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Connection settings for [`EvmLedger`].
#[derive(Clone, Debug)]
pub struct EvmConfig {
    pub rpc_url: String,
    pub contract: Address,
    pub chain_id: u64,
    /// Blocks to wait on top of the inclusion block before a call counts as final.
    pub confirmations: usize,
    /// Provider polling interval while waiting for receipts.
    pub poll_interval: Duration,
    /// First block scanned for events.
    pub event_start_block: u64,
    pub gas_limit: Option<u64>,
    pub gas_price_gwei: Option<u64>,
    /// Hex private keys signed locally; other signers must be unlocked on the node.
    pub private_keys: Vec<String>,
}

impl EvmConfig {
    pub fn new(rpc_url: impl Into<String>, contract: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract,
            chain_id: 31337,
            confirmations: 1,
            poll_interval: Duration::from_millis(500),
            event_start_block: 0,
            gas_limit: Some(DEFAULT_GAS_LIMIT),
            gas_price_gwei: Some(DEFAULT_GAS_PRICE_GWEI),
            private_keys: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct EvmLedger {
    provider: Provider<Http>,
    reader: PokerContract<Provider<Http>>,
    signers: Arc<HashMap<Address, PokerContract<SignedClient>>>,
    config: EvmConfig,
}

impl EvmLedger {
    pub fn new(config: EvmConfig) -> Result<Self> {
        let url = Url::parse(&config.rpc_url)?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(Error::InvalidScheme(scheme.to_string())),
        }
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())?
            .interval(config.poll_interval);
        let contract = to_h160(config.contract);
        let reader = PokerContract::new(contract, Arc::new(provider.clone()));

        let mut signers = HashMap::new();
        for key in &config.private_keys {
            let wallet: LocalWallet = key
                .trim()
                .trim_start_matches("0x")
                .parse()
                .map_err(|err| Error::InvalidKey(format!("{err}")))?;
            let wallet = wallet.with_chain_id(config.chain_id);
            let address = from_h160(wallet.address());
            let client = SignerMiddleware::new(provider.clone(), wallet);
            signers.insert(address, PokerContract::new(contract, Arc::new(client)));
        }
        info!(
            rpc_url = %config.rpc_url,
            contract = %config.contract,
            local_signers = signers.len(),
            "connected to poker contract"
        );

        Ok(Self {
            provider,
            reader,
            signers: Arc::new(signers),
            config,
        })
    }

    pub fn config(&self) -> &EvmConfig {
        &self.config
    }

    /// Addresses this ledger signs for locally.
    pub fn local_signers(&self) -> Vec<Address> {
        let mut signers: Vec<Address> = self.signers.keys().copied().collect();
        signers.sort();
        signers
    }

    /// Accounts the node has unlocked (`eth_accounts`).
    pub async fn node_accounts(&self) -> std::result::Result<Vec<Address>, LedgerError> {
        let accounts = self
            .provider
            .get_accounts()
            .await
            .map_err(|err| LedgerError::unavailable(err.to_string()))?;
        Ok(accounts.into_iter().map(from_h160).collect())
    }

    fn build<M: Middleware + 'static>(
        &self,
        contract: &PokerContract<M>,
        call: LedgerCall,
    ) -> ContractCall<M, ()> {
        let tx = match call {
            LedgerCall::CreateGame { buy_in } => contract.create_game(U256::from(buy_in)),
            LedgerCall::JoinGame { game_id, value } => contract
                .join_game(U256::from(game_id))
                .value(U256::from(value)),
            LedgerCall::StartGame { game_id } => contract.start_game(U256::from(game_id)),
            LedgerCall::Bet { game_id, amount } => {
                contract.bet(U256::from(game_id), U256::from(amount))
            }
            LedgerCall::Call { game_id } => contract.call(U256::from(game_id)),
            LedgerCall::Fold { game_id } => contract.fold(U256::from(game_id)),
        };
        let tx = match self.config.gas_limit {
            Some(gas) => tx.gas(gas),
            None => tx,
        };
        match self.config.gas_price_gwei {
            Some(gwei) => tx.legacy().gas_price(U256::from(gwei) * U256::from(GWEI)),
            None => tx,
        }
    }

    async fn confirm<M: Middleware + 'static>(
        &self,
        tx: ContractCall<M, ()>,
    ) -> std::result::Result<Confirmation, LedgerError> {
        let pending = tx.send().await.map_err(classify)?;
        let tx_hash = pending.tx_hash();
        debug!(tx_hash = %format!("{tx_hash:#x}"), "transaction sent");
        let receipt = pending
            .confirmations(self.config.confirmations)
            .await
            .map_err(|err| LedgerError::unavailable(err.to_string()))?
            .ok_or_else(|| {
                LedgerError::unavailable(format!("transaction {tx_hash:#x} dropped before confirmation"))
            })?;
        if receipt.status == Some(U64::zero()) {
            return Err(LedgerError::rejected(format!("transaction {tx_hash:#x} reverted")));
        }

        let created_game = receipt.logs.iter().find_map(|log| {
            let raw = RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            };
            GameCreatedFilter::decode_log(&raw)
                .ok()
                .and_then(|event| to_u64(event.game_id).ok())
        });

        Ok(Confirmation {
            tx_hash: format!("{tx_hash:#x}"),
            block_number: receipt.block_number.map(|n| n.as_u64()).unwrap_or(0),
            created_game,
        })
    }
}

impl Ledger for EvmLedger {
    async fn submit(
        &self,
        signer: Address,
        call: LedgerCall,
    ) -> std::result::Result<Confirmation, LedgerError> {
        match self.signers.get(&signer) {
            Some(contract) => self.confirm(self.build(contract, call)).await,
            None => {
                let tx = self.build(&self.reader, call).from(to_h160(signer));
                self.confirm(tx).await
            }
        }
    }

    async fn game_state(&self, game_id: GameId) -> std::result::Result<GameState, LedgerError> {
        let (stage, current_player, pot, players) = self
            .reader
            .get_game_state(U256::from(game_id))
            .call()
            .await
            .map_err(classify)?;
        let stage = Stage::try_from(stage).map_err(|err| LedgerError::invalid(err.to_string()))?;
        Ok(GameState {
            stage,
            current_player: from_h160(current_player),
            pot: to_wei(pot)?,
            players: players.into_iter().map(from_h160).collect(),
        })
    }

    async fn community_cards(&self, game_id: GameId) -> std::result::Result<Vec<u8>, LedgerError> {
        self.reader
            .get_community_cards(U256::from(game_id))
            .call()
            .await
            .map_err(classify)
    }

    async fn player_cards(
        &self,
        game_id: GameId,
        player: Address,
    ) -> std::result::Result<Vec<u8>, LedgerError> {
        self.reader
            .get_player_cards(U256::from(game_id), to_h160(player))
            .call()
            .await
            .map_err(classify)
    }

    async fn last_id(&self) -> std::result::Result<GameId, LedgerError> {
        let id = self.reader.get_last_id().call().await.map_err(classify)?;
        to_u64(id)
    }

    async fn game_ended_events(
        &self,
        from: EventCursor,
    ) -> std::result::Result<(Vec<GameEnded>, EventCursor), LedgerError> {
        let latest = self
            .provider
            .get_block_number()
            .await
            .map_err(|err| LedgerError::unavailable(err.to_string()))?
            .as_u64();
        let from_block = from.0.max(self.config.event_start_block);
        if from_block > latest {
            return Ok((Vec::new(), from));
        }
        let logs = self
            .reader
            .event::<GameEndedFilter>()
            .from_block(from_block)
            .to_block(latest)
            .query()
            .await
            .map_err(classify)?;
        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            events.push(GameEnded {
                game_id: to_u64(log.game_id)?,
                winner: from_h160(log.winner),
                winning_amount: to_wei(log.winning_amount)?,
            });
        }
        Ok((events, EventCursor(latest.saturating_add(1))))
    }
}

/// Sort a contract error into rejected (the node answered) or unavailable.
fn classify<M: Middleware>(err: ContractError<M>) -> LedgerError {
    match &err {
        ContractError::Revert(_) => LedgerError::rejected(err.to_string()),
        ContractError::MiddlewareError { e } => match MiddlewareError::as_error_response(e) {
            Some(response) => LedgerError::rejected(response.message.clone()),
            None => LedgerError::unavailable(err.to_string()),
        },
        ContractError::ProviderError { e } => match RpcError::as_error_response(e) {
            Some(response) => LedgerError::rejected(response.message.clone()),
            None => LedgerError::unavailable(err.to_string()),
        },
        _ => LedgerError::invalid(err.to_string()),
    }
}

fn to_h160(address: Address) -> H160 {
    H160::from(address.0)
}

fn from_h160(address: H160) -> Address {
    Address::new(address.0)
}

fn to_u64(value: U256) -> std::result::Result<u64, LedgerError> {
    if value > U256::from(u64::MAX) {
        return Err(LedgerError::invalid(format!("value {value} exceeds u64")));
    }
    Ok(value.as_u64())
}

fn to_wei(value: U256) -> std::result::Result<Wei, LedgerError> {
    if value > U256::from(u128::MAX) {
        return Err(LedgerError::invalid(format!("amount {value} exceeds u128")));
    }
    Ok(value.as_u128())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> Address {
        "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap()
    }

    #[test]
    fn rejects_non_http_scheme() {
        let Err(err) = EvmLedger::new(EvmConfig::new("ftp://example.com", contract())) else {
            panic!("ftp endpoint accepted");
        };
        assert!(matches!(err, Error::InvalidScheme(_)));
        assert_eq!(err.to_string(), "invalid URL scheme: ftp (expected http or https)");
    }

    #[test]
    fn registers_local_signers() {
        let mut config = EvmConfig::new("http://127.0.0.1:8545", contract());
        // Well-known first dev account of a local node.
        config.private_keys =
            vec!["0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string()];
        let ledger = EvmLedger::new(config).unwrap();
        let expected: Address = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap();
        assert_eq!(ledger.local_signers(), vec![expected]);
    }

    #[test]
    fn rejects_bad_private_key() {
        let mut config = EvmConfig::new("http://127.0.0.1:8545", contract());
        config.private_keys = vec!["not-a-key".to_string()];
        assert!(matches!(EvmLedger::new(config), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn converts_addresses_and_amounts() {
        let address = Address::from_low_u64(0xdead);
        assert_eq!(from_h160(to_h160(address)), address);
        assert_eq!(to_wei(U256::from(5u64)).unwrap(), 5);
        assert!(to_u64(U256::MAX).is_err());
        assert!(to_wei(U256::MAX).is_err());
    }
}
