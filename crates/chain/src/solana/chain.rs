use std::{collections::HashSet, fmt, future::Future, path::Path, str::FromStr};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer as _, SigningKey, Verifier, VerifyingKey};
use futures::StreamExt;
use solana_client::{
    nonblocking::{pubsub_client::PubsubClient, rpc_client::RpcClient},
    rpc_client::GetConfirmedSignaturesForAddress2Config,
    rpc_config::{RpcTransactionConfig, RpcTransactionLogsConfig, RpcTransactionLogsFilter},
    rpc_response::RpcConfirmedTransactionStatusWithSignature,
};
use solana_commitment_config::CommitmentConfig;
use solana_sdk::{
    message::Message,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, VersionedTransaction},
};
use solana_transaction_status_client_types::UiTransactionEncoding;
use tft_bridge_primitives::{
    constants::{MINT_SUBMIT_TIMEOUT, TFT_DECIMALS},
    types::{BurnEvent, DepositMemo, MintRequest, MintSignResponse},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    accounts::{associated_token_address, parse_mint, parse_multisig, MintInfo},
    burn::{classify_burn, classify_mint, legacy_instructions, short_id, versioned_instructions},
    programs::{memo, mint_to_checked, set_compute_unit_limit, CheckedAmount, SOLANA_COMPUTE_UNIT_LIMIT},
    SolanaEndpoints,
};
use crate::{
    errors::{ChainError, ChainResult},
    with_deadline, ChainEvent, ChainKind, DestinationChain, EventLookup, MintClaim,
};

const SIGNATURE_PAGE_LIMIT: usize = 1000;

/// Pages of mint history read when checking whether a deposit was already minted.
const MINT_HISTORY_PAGES: usize = 2;

/// Collects successful entries at or above `min_slot` from a signature history served newest
/// first by `next_page`. Stops after a short page or `max_pages` pages.
async fn walk_history<F, Fut>(
    min_slot: u64,
    max_pages: usize,
    mut next_page: F,
) -> ChainResult<Vec<RpcConfirmedTransactionStatusWithSignature>>
where
    F: FnMut(Option<Signature>) -> Fut,
    Fut: Future<Output = ChainResult<Vec<RpcConfirmedTransactionStatusWithSignature>>>,
{
    let mut history = Vec::new();
    let mut before = None;
    for _ in 0..max_pages {
        let page = next_page(before).await?;
        let Some(last) = page.last() else {
            return Ok(history);
        };
        before = Signature::from_str(&last.signature).ok();
        let exhausted =
            page.len() < SIGNATURE_PAGE_LIMIT || last.slot < min_slot || before.is_none();

        history.extend(
            page.into_iter()
                .filter(|status| status.err.is_none() && status.slot >= min_slot),
        );
        if exhausted {
            return Ok(history);
        }
    }
    debug!(pages = max_pages, "stopped reading mint history");
    Ok(history)
}

/// Loads the ed25519 key of a Solana JSON keypair file (an array of 64 bytes).
pub fn load_keypair_file(path: &Path) -> ChainResult<SigningKey> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ChainError::InvalidKey(format!("{}: {e}", path.display())))?;
    let bytes: Vec<u8> = serde_json::from_str(&contents)
        .map_err(|e| ChainError::InvalidKey(format!("{}: {e}", path.display())))?;
    if bytes.len() != 64 {
        return Err(ChainError::InvalidKey(format!(
            "{}: keypair must have 64 bytes, got {}",
            path.display(),
            bytes.len()
        )));
    }

    let mut secret = [0u8; 32];
    secret.copy_from_slice(&bytes[..32]);
    let key = SigningKey::from_bytes(&secret);
    if key.verifying_key().as_bytes()[..] != bytes[32..] {
        return Err(ChainError::InvalidKey(format!(
            "{}: public half does not match secret",
            path.display()
        )));
    }
    Ok(key)
}

fn encode_transaction(tx: &Transaction) -> ChainResult<String> {
    let bytes = bincode::serialize(tx).map_err(|e| ChainError::MalformedMint(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

fn decode_transaction(request: &MintRequest) -> ChainResult<Transaction> {
    let encoded = request
        .encoded_mint_tx
        .as_deref()
        .ok_or_else(|| ChainError::MalformedMint("mint transaction is missing".to_string()))?;
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| ChainError::MalformedMint(format!("mint transaction is not base64: {e}")))?;
    bincode::deserialize(&bytes)
        .map_err(|e| ChainError::MalformedMint(format!("mint transaction does not decode: {e}")))
}

fn parse_pubkey(s: &str) -> ChainResult<Pubkey> {
    Pubkey::from_str(s).map_err(|e| ChainError::InvalidReceiver(format!("{s}: {e}")))
}

/// Whether a memo summary of `getSignaturesForAddress` contains `text`.
///
/// The node renders each memo as `[len] text` and joins several memos with `; `.
fn memo_summary_contains(summary: &str, text: &str) -> bool {
    summary.split("; ").any(|part| {
        let part = match part.split_once("] ") {
            Some((prefix, rest)) if prefix.starts_with('[') => rest,
            _ => part,
        };
        part == text
    })
}

/// A [`DestinationChain`] backed by a token-2022 mint on Solana.
pub struct SolanaChain {
    rpc: RpcClient,
    ws_url: String,
    signing_key: SigningKey,
    address: Pubkey,
    mint: Pubkey,
}

impl fmt::Debug for SolanaChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaChain")
            .field("address", &self.address)
            .field("mint", &self.mint)
            .field("ws_url", &self.ws_url)
            .finish_non_exhaustive()
    }
}

impl SolanaChain {
    /// Creates the adapter for the token at `mint`, signing with `signing_key`.
    pub fn new(endpoints: SolanaEndpoints, mint: &str, signing_key: SigningKey) -> ChainResult<Self> {
        let mint = Pubkey::from_str(mint)
            .map_err(|e| ChainError::InvalidKey(format!("token program address {mint}: {e}")))?;
        let address = Pubkey::new_from_array(signing_key.verifying_key().to_bytes());
        info!(rpc = %endpoints.rpc, %address, %mint, "using solana node");

        Ok(Self {
            rpc: RpcClient::new_with_commitment(endpoints.rpc, CommitmentConfig::finalized()),
            ws_url: endpoints.ws,
            signing_key,
            address,
            mint,
        })
    }

    async fn mint_info(&self) -> ChainResult<MintInfo> {
        let data = self
            .rpc
            .get_account_data(&self.mint)
            .await
            .map_err(ChainError::rpc)?;
        parse_mint(&data)
    }

    /// The mint authority, its signers, and the number of signatures it requires.
    async fn authority(&self) -> ChainResult<(Pubkey, Vec<Pubkey>, usize)> {
        let authority = self
            .mint_info()
            .await?
            .mint_authority
            .ok_or_else(|| ChainError::Rpc(format!("mint {} has no authority", self.mint)))?;
        let data = self
            .rpc
            .get_account_data(&authority)
            .await
            .map_err(ChainError::rpc)?;

        match parse_multisig(&data) {
            Some(multisig) if multisig.is_initialized => {
                Ok((authority, multisig.signers, multisig.m as usize))
            }
            _ => Ok((authority, vec![authority], 1)),
        }
    }

    async fn signature_page(
        &self,
        before: Option<Signature>,
    ) -> ChainResult<Vec<RpcConfirmedTransactionStatusWithSignature>> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before,
            limit: Some(SIGNATURE_PAGE_LIMIT),
            commitment: Some(CommitmentConfig::finalized()),
            ..Default::default()
        };
        self.rpc
            .get_signatures_for_address_with_config(&self.mint, config)
            .await
            .map_err(ChainError::rpc)
    }

    /// Walks the successful transactions mentioning the mint, newest first, down to `min_slot`
    /// and at most `max_pages` pages deep.
    async fn mint_history(
        &self,
        min_slot: u64,
        max_pages: usize,
    ) -> ChainResult<Vec<RpcConfirmedTransactionStatusWithSignature>> {
        walk_history(min_slot, max_pages, |before| self.signature_page(before)).await
    }

    async fn fetch_transaction(&self, signature: &Signature) -> ChainResult<(u64, VersionedTransaction)> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(CommitmentConfig::finalized()),
            max_supported_transaction_version: Some(0),
        };
        let confirmed = self
            .rpc
            .get_transaction_with_config(signature, config)
            .await
            .map_err(ChainError::rpc)?;

        if confirmed
            .transaction
            .meta
            .as_ref()
            .is_some_and(|meta| meta.err.is_some())
        {
            return Err(ChainError::Rpc(format!("transaction {signature} failed")));
        }
        let tx = confirmed
            .transaction
            .transaction
            .decode()
            .ok_or_else(|| ChainError::Rpc(format!("cannot decode transaction {signature}")))?;
        Ok((confirmed.slot, tx))
    }

    /// Fetches `signature` and returns it as a burn event if it is a bridge burn of our mint.
    async fn fetch_burn(&self, signature: &Signature) -> ChainResult<Option<BurnEvent>> {
        let (slot, tx) = self.fetch_transaction(signature).await?;
        let burn = match versioned_instructions(&tx).and_then(|ixs| classify_burn(&ixs)) {
            Ok(burn) => burn,
            Err(reason) => {
                debug!(%signature, %reason, "not a bridge burn");
                return Ok(None);
            }
        };
        if burn.mint != self.mint {
            debug!(%signature, mint = %burn.mint, "burn of another mint");
            return Ok(None);
        }

        Ok(Some(BurnEvent {
            event_id: signature.to_string(),
            caller: burn.source.to_string(),
            amount: burn.amount.amount,
            memo: burn.memo,
            block_height: slot,
            short_id: short_id(signature),
            network: None,
        }))
    }

    async fn burn_from_log(&self, signature: &str) -> Option<BurnEvent> {
        let signature = Signature::from_str(signature).ok()?;
        if signature == Signature::default() {
            return None;
        }
        match self.fetch_burn(&signature).await {
            Ok(event) => event,
            Err(e) => {
                // Logs arrive before the transaction is queryable; a later log of the same
                // transaction is picked up instead.
                debug!(%signature, %e, "skipping log");
                None
            }
        }
    }

    fn partial_signature(&self, tx: &Transaction) -> ChainResult<MintSignResponse> {
        let required = tx.message.header.num_required_signatures as usize;
        let index = tx
            .message
            .account_keys
            .iter()
            .take(required)
            .position(|key| *key == self.address)
            .ok_or(ChainError::NotASigner)?;
        let signature = self.signing_key.sign(&tx.message_data());

        Ok(MintSignResponse {
            signer_address: self.address.to_string(),
            partial_signature: hex::encode(signature.to_bytes()),
            signer_index: Some(index),
        })
    }
}

/// Checks `response` against the signer slot it claims and returns the signature to place there.
fn verified_signature(
    tx: &Transaction,
    message: &[u8],
    response: &MintSignResponse,
) -> Result<(usize, Signature), String> {
    let required = tx.message.header.num_required_signatures as usize;
    let index = response
        .signer_index
        .filter(|index| *index < required)
        .ok_or("signature index out of range")?;
    let key = tx.message.account_keys[index];
    if key.to_string() != response.signer_address {
        return Err(format!("slot {index} belongs to {key}"));
    }

    let bytes = hex::decode(&response.partial_signature).map_err(|e| e.to_string())?;
    let signature = ed25519_dalek::Signature::from_slice(&bytes).map_err(|e| e.to_string())?;
    let verifying_key = VerifyingKey::from_bytes(&key.to_bytes()).map_err(|e| e.to_string())?;
    verifying_key
        .verify(message, &signature)
        .map_err(|e| e.to_string())?;
    Ok((index, Signature::from(signature.to_bytes())))
}

#[async_trait]
impl DestinationChain for SolanaChain {
    fn kind(&self) -> ChainKind {
        ChainKind::Solana
    }

    fn own_address(&self) -> String {
        self.address.to_string()
    }

    fn maturation_delay(&self) -> u64 {
        0
    }

    fn needs_signer_ids(&self) -> bool {
        true
    }

    async fn is_synced(&self) -> ChainResult<bool> {
        Ok(self.rpc.get_health().await.is_ok())
    }

    async fn head(&self) -> ChainResult<u64> {
        self.rpc.get_slot().await.map_err(ChainError::rpc)
    }

    async fn watch_events(
        &self,
        _from_height: u64,
        events: mpsc::Sender<ChainEvent>,
        cancel: CancellationToken,
    ) -> ChainResult<()> {
        let pubsub = PubsubClient::new(&self.ws_url).await.map_err(ChainError::rpc)?;
        let (mut logs, unsubscribe) = pubsub
            .logs_subscribe(
                RpcTransactionLogsFilter::Mentions(vec![self.mint.to_string()]),
                RpcTransactionLogsConfig {
                    commitment: Some(CommitmentConfig::finalized()),
                },
            )
            .await
            .map_err(ChainError::rpc)?;
        info!(mint = %self.mint, "subscribed to mint logs");

        let result = loop {
            let notification = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                notification = logs.next() => notification,
            };
            let Some(notification) = notification else {
                break Err(ChainError::SubscriptionClosed);
            };

            let Some(event) = self.burn_from_log(&notification.value.signature).await else {
                continue;
            };
            info!(signature = %event.event_id, amount = event.amount, memo = %event.memo, "observed burn");
            if events.send(ChainEvent::Withdraw(event)).await.is_err() {
                break Ok(());
            }
        };

        drop(logs);
        unsubscribe().await;
        result
    }

    async fn is_settled(&self, deposit_tx_hash: &str) -> ChainResult<bool> {
        for status in self.mint_history(0, MINT_HISTORY_PAGES).await? {
            let tagged = status
                .memo
                .as_deref()
                .is_some_and(|summary| memo_summary_contains(summary, deposit_tx_hash));
            if !tagged {
                continue;
            }
            let Ok(signature) = Signature::from_str(&status.signature) else {
                continue;
            };

            // Anyone can tag a transaction with the memo, so only a real mint of our token counts.
            let (_, tx) = self.fetch_transaction(&signature).await?;
            let is_mint = versioned_instructions(&tx)
                .map_err(|e| e.to_string())
                .and_then(|ixs| classify_mint(&ixs))
                .is_ok_and(|set| set.mint == self.mint && set.memo == deposit_tx_hash);
            if is_mint {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn required_signatures(&self) -> ChainResult<usize> {
        let (_, _, required) = self.authority().await?;
        Ok(required.saturating_sub(1))
    }

    async fn ordered_signer_set(&self) -> ChainResult<Vec<String>> {
        let (_, signers, _) = self.authority().await?;
        Ok(signers.iter().map(Pubkey::to_string).collect())
    }

    fn receiver_from_memo(&self, memo: &DepositMemo) -> ChainResult<String> {
        let DepositMemo::Hash(key) = memo else {
            return Err(ChainError::InvalidReceiver(
                "deposit memo must be a hash memo".to_string(),
            ));
        };
        let wallet = Pubkey::new_from_array(*key.as_bytes());
        Ok(associated_token_address(&wallet, &self.mint).to_string())
    }

    async fn validate_receiver(&self, memo: &DepositMemo) -> ChainResult<String> {
        let receiver = self.receiver_from_memo(memo)?;
        let account = self
            .rpc
            .get_account_with_commitment(&parse_pubkey(&receiver)?, CommitmentConfig::finalized())
            .await
            .map_err(ChainError::rpc)?
            .value;
        if account.is_none() {
            return Err(ChainError::InvalidReceiver(format!(
                "token account {receiver} does not exist"
            )));
        }
        Ok(receiver)
    }

    async fn prepare_mint(
        &self,
        mut request: MintRequest,
        online_signers: &[String],
    ) -> ChainResult<MintRequest> {
        let receiver = parse_pubkey(&request.receiver)?;
        let info = self.mint_info().await?;
        let (authority, signers, required) = self.authority().await?;
        if !signers.contains(&self.address) {
            return Err(ChainError::NotASigner);
        }

        let online: HashSet<Pubkey> = online_signers
            .iter()
            .filter_map(|s| Pubkey::from_str(s).ok())
            .collect();
        let mut chosen = vec![self.address];
        for signer in &signers {
            if chosen.len() >= required {
                break;
            }
            if *signer != self.address && online.contains(signer) {
                chosen.push(*signer);
            }
        }
        if chosen.len() < required {
            return Err(ChainError::ThresholdNotMet {
                got: chosen.len(),
                required,
            });
        }
        chosen.sort_by_key(|key| signers.iter().position(|s| s == key));

        let multisig_signers: &[Pubkey] = if authority == self.address {
            &[]
        } else {
            &chosen
        };
        let instructions = [
            set_compute_unit_limit(SOLANA_COMPUTE_UNIT_LIMIT),
            memo(&request.deposit_tx_hash, &self.address),
            mint_to_checked(
                &self.mint,
                &receiver,
                &authority,
                multisig_signers,
                CheckedAmount {
                    amount: request.amount,
                    decimals: info.decimals,
                },
            ),
        ];
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(ChainError::rpc)?;
        let message = Message::new_with_blockhash(&instructions, Some(&self.address), &blockhash);
        let tx = Transaction::new_unsigned(message);

        debug!(
            deposit = %request.deposit_tx_hash,
            signers = ?chosen,
            "built mint transaction"
        );
        request.encoded_mint_tx = Some(encode_transaction(&tx)?);
        request.required_signatures = chosen.len() - 1;
        Ok(request)
    }

    fn decode_mint(&self, request: &MintRequest) -> ChainResult<MintClaim> {
        let tx = decode_transaction(request)?;
        let instructions =
            legacy_instructions(&tx).map_err(|e| ChainError::MalformedMint(e.to_string()))?;
        let set = classify_mint(&instructions).map_err(ChainError::MalformedMint)?;
        if set.mint != self.mint {
            return Err(ChainError::MalformedMint(format!(
                "mint of another token {}",
                set.mint
            )));
        }
        if set.amount.decimals != TFT_DECIMALS {
            return Err(ChainError::MalformedMint(format!(
                "mint uses {} decimals",
                set.amount.decimals
            )));
        }

        Ok(MintClaim {
            receiver: set.destination.to_string(),
            amount: set.amount.amount,
            memo: set.memo,
        })
    }

    async fn produce_partial_signature(
        &self,
        request: &MintRequest,
    ) -> ChainResult<MintSignResponse> {
        self.partial_signature(&decode_transaction(request)?)
    }

    fn check_mint_signature(
        &self,
        request: &MintRequest,
        _signer_set: &[String],
        response: &MintSignResponse,
    ) -> ChainResult<()> {
        let tx = decode_transaction(request)?;
        verified_signature(&tx, &tx.message_data(), response)
            .map(|_| ())
            .map_err(ChainError::MalformedMint)
    }

    async fn assemble_and_submit(
        &self,
        request: &MintRequest,
        signatures: Vec<MintSignResponse>,
    ) -> ChainResult<String> {
        let mut tx = decode_transaction(request)?;
        let message = tx.message_data();
        let own = self.partial_signature(&tx)?;

        for response in signatures.iter().chain(std::iter::once(&own)) {
            match verified_signature(&tx, &message, response) {
                Ok((index, signature)) => tx.signatures[index] = signature,
                Err(reason) => {
                    warn!(signer = %response.signer_address, %reason, "dropping invalid mint signature");
                }
            }
        }

        let required = tx.message.header.num_required_signatures as usize;
        let got = tx
            .signatures
            .iter()
            .filter(|s| **s != Signature::default())
            .count();
        if got < required {
            return Err(ChainError::ThresholdNotMet { got, required });
        }
        tx.verify()
            .map_err(|e| ChainError::MalformedMint(format!("assembled mint does not verify: {e}")))?;

        info!(deposit = %request.deposit_tx_hash, amount = request.amount, "submitting mint");
        let signature = with_deadline(MINT_SUBMIT_TIMEOUT, "mint confirmation", async {
            self.rpc
                .send_and_confirm_transaction(&tx)
                .await
                .map_err(ChainError::rpc)
        })
        .await?;
        Ok(signature.to_string())
    }

    async fn find_event(&self, lookup: &EventLookup) -> ChainResult<Option<BurnEvent>> {
        for status in self.mint_history(lookup.block_start, usize::MAX).await? {
            let Ok(signature) = Signature::from_str(&status.signature) else {
                continue;
            };
            if short_id(&signature) != lookup.short_id {
                continue;
            }
            let event = self.fetch_burn(&signature).await?;
            return Ok(event.filter(|event| event.caller == lookup.receiver));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use solana_sdk::hash::Hash;

    use super::*;
    use crate::solana::SolanaNetwork;

    fn key(byte: u8) -> SigningKey {
        SigningKey::from_bytes(&[byte; 32])
    }

    fn pubkey(key: &SigningKey) -> Pubkey {
        Pubkey::new_from_array(key.verifying_key().to_bytes())
    }

    /// A full page of successful signatures, the newest at `top_slot`.
    fn full_page(top_slot: u64) -> Vec<RpcConfirmedTransactionStatusWithSignature> {
        (0..SIGNATURE_PAGE_LIMIT as u64)
            .map(|i| {
                serde_json::from_value(serde_json::json!({
                    "signature": Signature::from([(i % 250) as u8 + 1; 64]).to_string(),
                    "slot": top_slot - i,
                    "err": null,
                    "memo": null,
                    "blockTime": null,
                    "confirmationStatus": null,
                }))
                .unwrap()
            })
            .collect()
    }

    fn chain(signing_key: SigningKey, mint: Pubkey) -> SolanaChain {
        let endpoints = SolanaEndpoints::resolve(SolanaNetwork::Local, None);
        SolanaChain::new(endpoints, &mint.to_string(), signing_key).unwrap()
    }

    /// A mint transaction paid by `payer` and co-signed by `cosigner` through a multisig.
    fn mint_request(payer: &SigningKey, cosigner: &SigningKey, mint: Pubkey) -> MintRequest {
        let payer = pubkey(payer);
        let authority = Pubkey::new_from_array([9; 32]);
        let destination = Pubkey::new_from_array([8; 32]);
        let instructions = [
            set_compute_unit_limit(SOLANA_COMPUTE_UNIT_LIMIT),
            memo(&"ab".repeat(32), &payer),
            mint_to_checked(
                &mint,
                &destination,
                &authority,
                &[payer, pubkey(cosigner)],
                CheckedAmount {
                    amount: 500_000_000,
                    decimals: TFT_DECIMALS,
                },
            ),
        ];
        let message = Message::new_with_blockhash(&instructions, Some(&payer), &Hash::default());
        let tx = Transaction::new_unsigned(message);

        MintRequest {
            receiver: destination.to_string(),
            amount: 500_000_000,
            deposit_tx_hash: "ab".repeat(32),
            required_signatures: 1,
            encoded_mint_tx: Some(encode_transaction(&tx).unwrap()),
        }
    }

    #[test]
    fn decodes_proposed_mint() {
        let mint = Pubkey::new_from_array([7; 32]);
        let leader = key(1);
        let request = mint_request(&leader, &key(2), mint);

        let claim = chain(key(2), mint).decode_mint(&request).unwrap();
        assert_eq!(claim.receiver, request.receiver);
        assert_eq!(claim.amount, 500_000_000);
        assert_eq!(claim.memo, request.deposit_tx_hash);

        let other = chain(key(2), Pubkey::new_from_array([6; 32]));
        assert!(matches!(
            other.decode_mint(&request),
            Err(ChainError::MalformedMint(_))
        ));

        let mut broken = request.clone();
        broken.encoded_mint_tx = Some("not base64!".to_string());
        assert!(chain(key(2), mint).decode_mint(&broken).is_err());
    }

    #[tokio::test]
    async fn signatures_land_in_their_slots() {
        let mint = Pubkey::new_from_array([7; 32]);
        let (leader_key, cosigner_key, outsider_key) = (key(1), key(2), key(3));
        let request = mint_request(&leader_key, &cosigner_key, mint);
        let leader = chain(leader_key, mint);
        let cosigner = chain(cosigner_key, mint);

        let response = cosigner.produce_partial_signature(&request).await.unwrap();
        let own = leader.produce_partial_signature(&request).await.unwrap();
        assert_eq!(own.signer_index, Some(0));
        assert_eq!(response.signer_index, Some(1));

        let outsider = chain(outsider_key, mint);
        assert!(matches!(
            outsider.produce_partial_signature(&request).await,
            Err(ChainError::NotASigner)
        ));

        let mut tx = decode_transaction(&request).unwrap();
        let message = tx.message_data();
        for r in [&own, &response] {
            let (index, signature) = verified_signature(&tx, &message, r).unwrap();
            tx.signatures[index] = signature;
        }
        assert!(tx.verify().is_ok());

        let mut forged = response.clone();
        forged.signer_index = Some(0);
        assert!(verified_signature(&tx, &message, &forged).is_err());
        forged.signer_index = Some(7);
        assert!(verified_signature(&tx, &message, &forged).is_err());
    }

    #[tokio::test]
    async fn cosigner_signatures_are_checked_one_by_one() {
        let mint = Pubkey::new_from_array([7; 32]);
        let (leader_key, cosigner_key) = (key(1), key(2));
        let request = mint_request(&leader_key, &cosigner_key, mint);
        let leader = chain(leader_key, mint);
        let cosigner = chain(cosigner_key, mint);

        let response = cosigner.produce_partial_signature(&request).await.unwrap();
        assert!(leader.check_mint_signature(&request, &[], &response).is_ok());

        let mut garbage = response.clone();
        garbage.partial_signature = "11".repeat(64);
        assert!(matches!(
            leader.check_mint_signature(&request, &[], &garbage),
            Err(ChainError::MalformedMint(_))
        ));

        let other = mint_request(&key(1), &key(3), mint);
        assert!(leader.check_mint_signature(&other, &[], &response).is_err());
    }

    #[test]
    fn hash_memo_maps_to_associated_account() {
        let mint = Pubkey::new_from_array([7; 32]);
        let chain = chain(key(1), mint);
        let wallet = [4u8; 32];

        let receiver = chain
            .receiver_from_memo(&DepositMemo::Hash(wallet.into()))
            .unwrap();
        assert_eq!(
            receiver,
            associated_token_address(&Pubkey::new_from_array(wallet), &mint).to_string()
        );
        assert!(matches!(
            chain.receiver_from_memo(&DepositMemo::Text("wallet".to_string())),
            Err(ChainError::InvalidReceiver(_))
        ));
    }

    #[test]
    fn memo_summaries() {
        let hash = "ab".repeat(32);
        assert!(memo_summary_contains(&format!("[64] {hash}"), &hash));
        assert!(memo_summary_contains(&format!("[4] GABC; [64] {hash}"), &hash));
        assert!(!memo_summary_contains("[4] GABC", &hash));
    }

    #[test]
    fn keypair_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("tft-bridge-keypair-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("id.json");

        let signing_key = key(5);
        let mut bytes = signing_key.to_bytes().to_vec();
        bytes.extend_from_slice(signing_key.verifying_key().as_bytes());
        std::fs::write(&path, serde_json::to_string(&bytes).unwrap()).unwrap();
        assert_eq!(load_keypair_file(&path).unwrap().to_bytes(), signing_key.to_bytes());

        bytes[40] ^= 1;
        std::fs::write(&path, serde_json::to_string(&bytes).unwrap()).unwrap();
        assert!(load_keypair_file(&path).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn mint_history_is_read_a_bounded_number_of_pages_deep() {
        let mut pages = 0u64;
        let history = walk_history(0, MINT_HISTORY_PAGES, |_| {
            pages += 1;
            let page = full_page(10_000_000 - pages * SIGNATURE_PAGE_LIMIT as u64);
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(pages, MINT_HISTORY_PAGES as u64);
        assert_eq!(history.len(), MINT_HISTORY_PAGES * SIGNATURE_PAGE_LIMIT);
    }

    #[tokio::test]
    async fn event_history_stops_below_the_start_slot() {
        let mut pages = 0u64;
        let history = walk_history(9_999_500, usize::MAX, |_| {
            pages += 1;
            let page = full_page(10_000_000 - (pages - 1) * SIGNATURE_PAGE_LIMIT as u64);
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(pages, 1);
        assert_eq!(history.len(), 501);
        assert!(history.iter().all(|status| status.slot >= 9_999_500));
    }
}
