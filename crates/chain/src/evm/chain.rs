use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use ethers::{
    abi::RawLog,
    contract::EthEvent,
    middleware::SignerMiddleware,
    providers::{Middleware, Provider, Ws},
    signers::{LocalWallet, Signer},
    types::{Address, Filter, Log, Signature, SyncingStatus, H256, U256, U64},
};
use futures::StreamExt;
use tft_bridge_primitives::{
    constants::{EVM_BLOCK_DELAY, MINT_SUBMIT_TIMEOUT},
    memo::ShortId,
    types::{BurnEvent, DepositMemo, MintRequest, MintSignResponse},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    contract::{TftContract, WithdrawFilter},
    signing::{
        address_string, check_signature, empty_contract_signature, mint_digest, parse_address,
        receiver_from_memo, sign_digest, to_contract_signature,
    },
};
use crate::{
    errors::{ChainError, ChainResult},
    with_deadline, ChainEvent, ChainKind, DestinationChain, EventLookup, MintClaim,
};

type EvmClient = SignerMiddleware<Provider<Ws>, LocalWallet>;

/// A [`DestinationChain`] backed by the multisig token contract on an EVM chain.
pub struct EvmChain {
    client: Arc<EvmClient>,
    contract: TftContract<EvmClient>,
    contract_address: Address,
}

impl fmt::Debug for EvmChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmChain")
            .field("address", &self.client.address())
            .field("contract", &self.contract_address)
            .finish_non_exhaustive()
    }
}

impl EvmChain {
    /// Connects to the websocket endpoint at `url`.
    pub async fn connect(url: &str, contract_address: &str, private_key: &str) -> ChainResult<Self> {
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| ChainError::InvalidKey(format!("eth private key: {e}")))?;
        let contract_address = parse_address(contract_address)
            .map_err(|e| ChainError::InvalidKey(format!("contract address: {e}")))?;

        let provider = Provider::<Ws>::connect(url).await.map_err(ChainError::rpc)?;
        let chain_id = provider.get_chainid().await.map_err(ChainError::rpc)?;
        let wallet = wallet.with_chain_id(chain_id.as_u64());
        info!(%url, chain_id = %chain_id, address = %address_string(&wallet.address()), "connected to evm node");

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let contract = TftContract::new(contract_address, client.clone());
        Ok(Self {
            client,
            contract,
            contract_address,
        })
    }

    fn withdraw_filter(&self) -> Filter {
        Filter::new()
            .address(self.contract_address)
            .topic0(WithdrawFilter::signature())
    }

    async fn signers(&self) -> ChainResult<Vec<Address>> {
        self.contract
            .get_signers()
            .call()
            .await
            .map_err(ChainError::rpc)
    }

    async fn total_required(&self) -> ChainResult<usize> {
        let required: U256 = self
            .contract
            .get_signatures_required()
            .call()
            .await
            .map_err(ChainError::rpc)?;
        Ok(required.low_u64() as usize)
    }

    async fn sign_request(&self, request: &MintRequest) -> ChainResult<([u8; 32], Signature)> {
        let receiver = parse_address(&request.receiver)?;
        let digest = mint_digest(receiver, request.amount, &request.deposit_tx_hash);
        let signature = sign_digest(self.client.signer(), digest).await?;
        Ok((digest, signature))
    }

    async fn replay(
        &self,
        from: u64,
        to: u64,
        events: &mpsc::Sender<ChainEvent>,
    ) -> ChainResult<bool> {
        if from > to {
            return Ok(true);
        }
        let filter = self.withdraw_filter().from_block(from).to_block(to);
        let logs = self.client.get_logs(&filter).await.map_err(ChainError::rpc)?;
        info!(from, to, count = logs.len(), "replaying historic withdraw events");

        for log in &logs {
            if let Some(event) = burn_event_from_log(log) {
                if events.send(ChainEvent::Withdraw(event)).await.is_err() {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

/// Converts a `Withdraw` log of the token contract into a [`BurnEvent`].
///
/// Returns `None` for logs that are not withdraws, were removed by a reorg, or carry an amount
/// that does not fit the Stellar side.
pub fn burn_event_from_log(log: &Log) -> Option<BurnEvent> {
    if log.removed == Some(true) {
        debug!(tx = ?log.transaction_hash, "skipping removed log");
        return None;
    }
    let tx_hash = log.transaction_hash?;
    let block_height = log.block_number?.as_u64();

    let withdraw = match WithdrawFilter::decode_log(&RawLog::from(log.clone())) {
        Ok(withdraw) => withdraw,
        Err(e) => {
            warn!(tx = ?tx_hash, %e, "cannot decode withdraw log");
            return None;
        }
    };
    if withdraw.tokens > U256::from(u64::MAX) {
        warn!(tx = ?tx_hash, tokens = %withdraw.tokens, "withdraw amount out of range");
        return None;
    }

    Some(BurnEvent {
        event_id: format!("{tx_hash:#x}"),
        caller: address_string(&withdraw.receiver),
        amount: withdraw.tokens.as_u64(),
        memo: withdraw.blockchain_address,
        block_height,
        short_id: ShortId::new(tx_hash.0),
        network: Some(withdraw.network),
    })
}

fn address_topic(address: Address) -> H256 {
    let mut topic = [0u8; 32];
    topic[12..].copy_from_slice(address.as_bytes());
    H256(topic)
}

#[async_trait]
impl DestinationChain for EvmChain {
    fn kind(&self) -> ChainKind {
        ChainKind::Evm
    }

    fn own_address(&self) -> String {
        address_string(&self.client.address())
    }

    fn maturation_delay(&self) -> u64 {
        EVM_BLOCK_DELAY
    }

    async fn is_synced(&self) -> ChainResult<bool> {
        let status = self.client.syncing().await.map_err(ChainError::rpc)?;
        Ok(matches!(status, SyncingStatus::IsFalse))
    }

    async fn head(&self) -> ChainResult<u64> {
        let head: U64 = self
            .client
            .get_block_number()
            .await
            .map_err(ChainError::rpc)?;
        Ok(head.as_u64())
    }

    async fn watch_events(
        &self,
        from_height: u64,
        events: mpsc::Sender<ChainEvent>,
        cancel: CancellationToken,
    ) -> ChainResult<()> {
        let provider = self.client.provider();

        // Subscribe before reading the head so nothing falls between replay and live stream.
        let mut heads = provider.subscribe_blocks().await.map_err(ChainError::rpc)?;
        let mut logs = provider
            .subscribe_logs(&self.withdraw_filter())
            .await
            .map_err(ChainError::rpc)?;

        let head = self.head().await?;
        if !self.replay(from_height, head, &events).await? {
            return Ok(());
        }
        if events.send(ChainEvent::Head(head)).await.is_err() {
            return Ok(());
        }

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                block = heads.next() => {
                    let block = block.ok_or(ChainError::SubscriptionClosed)?;
                    let Some(number) = block.number else {
                        continue;
                    };
                    ChainEvent::Head(number.as_u64())
                }
                log = logs.next() => {
                    let log = log.ok_or(ChainError::SubscriptionClosed)?;
                    let Some(event) = burn_event_from_log(&log) else {
                        continue;
                    };
                    ChainEvent::Withdraw(event)
                }
            };

            if events.send(event).await.is_err() {
                return Ok(());
            }
        }
    }

    async fn is_settled(&self, deposit_tx_hash: &str) -> ChainResult<bool> {
        self.contract
            .is_mint_id(deposit_tx_hash.to_string())
            .call()
            .await
            .map_err(ChainError::rpc)
    }

    async fn required_signatures(&self) -> ChainResult<usize> {
        Ok(self.total_required().await?.saturating_sub(1))
    }

    async fn ordered_signer_set(&self) -> ChainResult<Vec<String>> {
        Ok(self.signers().await?.iter().map(address_string).collect())
    }

    fn receiver_from_memo(&self, memo: &DepositMemo) -> ChainResult<String> {
        receiver_from_memo(memo).map(|address| address_string(&address))
    }

    async fn prepare_mint(
        &self,
        request: MintRequest,
        _online_signers: &[String],
    ) -> ChainResult<MintRequest> {
        Ok(request)
    }

    fn decode_mint(&self, request: &MintRequest) -> ChainResult<MintClaim> {
        let receiver = parse_address(&request.receiver)
            .map_err(|e| ChainError::MalformedMint(e.to_string()))?;
        Ok(MintClaim {
            receiver: address_string(&receiver),
            amount: request.amount,
            memo: request.deposit_tx_hash.clone(),
        })
    }

    async fn produce_partial_signature(
        &self,
        request: &MintRequest,
    ) -> ChainResult<MintSignResponse> {
        let (_, signature) = self.sign_request(request).await?;
        Ok(MintSignResponse {
            signer_address: self.own_address(),
            partial_signature: hex::encode(signature.to_vec()),
            signer_index: None,
        })
    }

    fn check_mint_signature(
        &self,
        request: &MintRequest,
        signer_set: &[String],
        response: &MintSignResponse,
    ) -> ChainResult<()> {
        let receiver = parse_address(&request.receiver)?;
        let digest = mint_digest(receiver, request.amount, &request.deposit_tx_hash);
        check_signature(digest, signer_set, response).map(|_| ())
    }

    async fn assemble_and_submit(
        &self,
        request: &MintRequest,
        signatures: Vec<MintSignResponse>,
    ) -> ChainResult<String> {
        let receiver = parse_address(&request.receiver)?;
        let (digest, own_signature) = self.sign_request(request).await?;
        let signers = self.signers().await?;
        let signer_set: Vec<String> = signers.iter().map(address_string).collect();
        let required = self.total_required().await?;

        let mut by_signer: HashMap<Address, Signature> = HashMap::new();
        by_signer.insert(self.client.address(), own_signature);
        for response in signatures {
            match check_signature(digest, &signer_set, &response) {
                Ok((signer, signature)) => {
                    by_signer.insert(signer, signature);
                }
                Err(e) => {
                    warn!(signer = %response.signer_address, %e, "dropping invalid mint signature");
                }
            }
        }

        let got = signers.iter().filter(|s| by_signer.contains_key(s)).count();
        if got < required {
            return Err(ChainError::ThresholdNotMet { got, required });
        }

        let ordered = signers
            .iter()
            .map(|signer| {
                by_signer
                    .get(signer)
                    .map(to_contract_signature)
                    .unwrap_or_else(empty_contract_signature)
            })
            .collect::<Vec<_>>();

        info!(
            deposit = %request.deposit_tx_hash,
            receiver = %address_string(&receiver),
            amount = request.amount,
            signatures = got,
            "submitting mint"
        );
        let call = self.contract.mint_tokens(
            receiver,
            U256::from(request.amount),
            request.deposit_tx_hash.clone(),
            ordered,
        );
        let receipt = with_deadline(MINT_SUBMIT_TIMEOUT, "mint confirmation", async {
            let pending = call.send().await.map_err(ChainError::rpc)?;
            pending.await.map_err(ChainError::rpc)
        })
        .await?
        .ok_or_else(|| ChainError::Rpc("mint transaction was dropped".to_string()))?;

        if receipt.status == Some(U64::zero()) {
            return Err(ChainError::Rpc(format!(
                "mint transaction {:#x} reverted",
                receipt.transaction_hash
            )));
        }
        Ok(format!("{:#x}", receipt.transaction_hash))
    }

    async fn find_event(&self, lookup: &EventLookup) -> ChainResult<Option<BurnEvent>> {
        let receiver = parse_address(&lookup.receiver)
            .map_err(|e| ChainError::MalformedMint(e.to_string()))?;
        let filter = self
            .withdraw_filter()
            .topic1(address_topic(receiver))
            .from_block(lookup.block_start);
        let logs = self.client.get_logs(&filter).await.map_err(ChainError::rpc)?;

        Ok(logs
            .iter()
            .filter(|log| log.transaction_hash.map(|h| h.0) == Some(*lookup.short_id.as_bytes()))
            .find_map(burn_event_from_log))
    }
}

#[cfg(test)]
mod tests {
    use ethers::{
        abi::{self, Token},
        types::Bytes,
    };

    use super::*;

    fn withdraw_log(tokens: U256, removed: bool) -> Log {
        let receiver: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        Log {
            topics: vec![WithdrawFilter::signature(), address_topic(receiver)],
            data: Bytes::from(abi::encode(&[
                Token::Uint(tokens),
                Token::String("GBSTELLARRECEIVER".to_string()),
                Token::String("stellar".to_string()),
            ])),
            transaction_hash: Some(H256::repeat_byte(0xab)),
            block_number: Some(U64::from(1000)),
            removed: Some(removed),
            ..Default::default()
        }
    }

    #[test]
    fn withdraw_log_becomes_burn_event() {
        let event = burn_event_from_log(&withdraw_log(U256::from(100_000_000u64), false)).unwrap();
        assert_eq!(event.amount, 100_000_000);
        assert_eq!(event.block_height, 1000);
        assert_eq!(event.memo, "GBSTELLARRECEIVER");
        assert_eq!(event.caller, "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
        assert_eq!(event.network.as_deref(), Some("stellar"));
        assert_eq!(event.short_id.as_bytes(), &[0xab; 32]);
        assert_eq!(event.event_id, format!("0x{}", "ab".repeat(32)));
    }

    #[test]
    fn removed_and_oversized_logs_are_skipped() {
        assert!(burn_event_from_log(&withdraw_log(U256::from(5u64), true)).is_none());
        assert!(burn_event_from_log(&withdraw_log(U256::MAX, false)).is_none());

        let mut log = withdraw_log(U256::from(5u64), false);
        log.data = Bytes::from(vec![1, 2, 3]);
        assert!(burn_event_from_log(&log).is_none());
    }

    #[test]
    fn receiver_topic_is_left_padded() {
        let address = Address::repeat_byte(0x11);
        let topic = address_topic(address);
        assert_eq!(&topic.0[..12], &[0u8; 12]);
        assert_eq!(&topic.0[12..], address.as_bytes());
    }
}
