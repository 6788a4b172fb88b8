use std::time::Duration;

use alloy::{
    consensus::{SignableTransaction, TxEnvelope, TxLegacy},
    eips::eip2718::Encodable2718,
    network::TxSignerSync,
    primitives::{Address, Bytes, TxKind, B256, U256},
    providers::{Provider, RootProvider},
    rpc::types::{TransactionInput, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use anyhow::Context;

use crate::config::LedgerConfig;

use super::{ClientError, ConfirmedReceipt, LedgerClient, TxPlan};

/// JSON-RPC backed [`LedgerClient`] for an EVM chain.
///
/// Transactions are legacy (pre-EIP-1559) with an EIP-155 chain id, which is
/// what local development chains expect. The chain id is queried once at
/// connect time.
pub struct EthLedgerClient {
    provider: RootProvider,
    signer: PrivateKeySigner,
    sender: Address,
    contract: Address,
    chain_id: u64,
    receipt_poll_interval: Duration,
    receipt_poll_attempts: u32,
}

impl EthLedgerClient {
    pub async fn connect(cfg: &LedgerConfig) -> anyhow::Result<Self> {
        let url: Url = cfg.rpc_url.parse().context("invalid ledger RPC URL")?;
        let provider = RootProvider::new_http(url);

        let signer: PrivateKeySigner =
            cfg.private_key.parse().context("invalid signing key")?;
        let sender: Address = cfg.account.parse().context("invalid account address")?;
        if signer.address() != sender {
            tracing::warn!(
                configured = %sender,
                derived = %signer.address(),
                "configured account does not match the signing key"
            );
        }
        let contract: Address = cfg
            .contract_address
            .parse()
            .context("invalid contract address")?;

        let chain_id = provider
            .get_chain_id()
            .await
            .context("failed to query chain id from the ledger RPC endpoint")?;
        tracing::info!(chain_id, contract = %contract, "connected to ledger");

        Ok(Self {
            provider,
            signer,
            sender,
            contract,
            chain_id,
            receipt_poll_interval: Duration::from_millis(cfg.receipt_poll_ms),
            receipt_poll_attempts: cfg.receipt_poll_attempts,
        })
    }

    fn call_request(&self, data: Bytes, value: Option<U256>) -> TransactionRequest {
        TransactionRequest {
            from: Some(self.sender),
            to: Some(TxKind::Call(self.contract)),
            value,
            input: TransactionInput::new(data),
            ..Default::default()
        }
    }
}

fn rpc_err(e: impl std::fmt::Display) -> ClientError {
    ClientError::Rpc(e.to_string())
}

#[async_trait::async_trait]
impl LedgerClient for EthLedgerClient {
    async fn estimate_gas(&self, data: &Bytes, value: U256) -> Result<u64, ClientError> {
        let req = self.call_request(data.clone(), Some(value));
        self.provider.estimate_gas(req).await.map_err(rpc_err)
    }

    async fn gas_price(&self) -> Result<u128, ClientError> {
        self.provider.get_gas_price().await.map_err(rpc_err)
    }

    async fn transaction_count(&self) -> Result<u64, ClientError> {
        // Pending view: counts transactions already in the mempool so rapid
        // repeated submissions from this account do not collide on a nonce.
        self.provider
            .get_transaction_count(self.sender)
            .pending()
            .await
            .map_err(rpc_err)
    }

    async fn sign_transaction(&self, plan: &TxPlan) -> Result<Bytes, ClientError> {
        let mut tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: plan.nonce,
            gas_price: plan.gas_price,
            gas_limit: plan.gas_limit,
            to: TxKind::Call(self.contract),
            value: plan.value,
            input: plan.data.clone(),
        };
        let signature = self
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| ClientError::Signer(e.to_string()))?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        Ok(envelope.encoded_2718().into())
    }

    async fn submit(&self, raw: &Bytes) -> Result<B256, ClientError> {
        let pending = self
            .provider
            .send_raw_transaction(raw.as_ref())
            .await
            .map_err(rpc_err)?;
        Ok(*pending.tx_hash())
    }

    async fn await_receipt(&self, hash: B256) -> Result<ConfirmedReceipt, ClientError> {
        let mut attempt: u32 = 0;
        loop {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    return Ok(ConfirmedReceipt {
                        tx_hash: hash,
                        block_number: receipt.block_number,
                        success: receipt.status(),
                    });
                }
                Ok(None) if attempt < self.receipt_poll_attempts => {
                    attempt += 1;
                    tokio::time::sleep(self.receipt_poll_interval).await;
                }
                Ok(None) => return Err(ClientError::ReceiptNotFound(attempt)),
                Err(e) => return Err(rpc_err(e)),
            }
        }
    }

    async fn read_call(&self, data: Bytes) -> Result<Bytes, ClientError> {
        let req = self.call_request(data, None);
        self.provider.call(req).await.map_err(rpc_err)
    }
}
