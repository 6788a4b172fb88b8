pub mod contract;
mod eth;
pub mod submission;

pub use contract::BillingCall;
pub use eth::EthLedgerClient;
pub use submission::submit_call;

use std::fmt;

use alloy::primitives::{Bytes, B256, U256};

/// Amount owed, denominated in the smallest ledger unit.
pub type BillAmount = U256;

/// The fixed sequence a state-mutating call goes through. Used to attribute
/// a failure to the exact point in the chain where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStep {
    EncodeCall,
    EstimateGas,
    FetchGasPrice,
    FetchNonce,
    Sign,
    Submit,
    AwaitReceipt,
}

impl fmt::Display for SubmissionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EncodeCall => "encode_call",
            Self::EstimateGas => "estimate_gas",
            Self::FetchGasPrice => "fetch_gas_price",
            Self::FetchNonce => "fetch_nonce",
            Self::Sign => "sign",
            Self::Submit => "submit",
            Self::AwaitReceipt => "await_receipt",
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("signer error: {0}")]
    Signer(String),
    #[error("no receipt found after {0} polls")]
    ReceiptNotFound(u32),
}

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("submission step `{step}` failed: {source}")]
    Step {
        step: SubmissionStep,
        #[source]
        source: ClientError,
    },
    #[error("transaction {0} reverted on chain")]
    Reverted(B256),
    #[error("contract read failed: {0}")]
    Read(#[source] ClientError),
    #[error("malformed contract return data: {0}")]
    Decode(String),
}

/// Everything a signed call needs beyond the client's own identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPlan {
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub nonce: u64,
}

/// Inclusion confirmation as the session cares about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// Primitive ledger operations, one per suspending step of the submission
/// chain plus the free read-only call. Object-safe so the session can hold a
/// test double behind the same seam as the real RPC client.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    async fn estimate_gas(&self, data: &Bytes, value: U256) -> Result<u64, ClientError>;
    async fn gas_price(&self) -> Result<u128, ClientError>;
    /// The sender's next transaction sequence number, pending-inclusive.
    async fn transaction_count(&self) -> Result<u64, ClientError>;
    /// Signs locally; the key never leaves the process.
    async fn sign_transaction(&self, plan: &TxPlan) -> Result<Bytes, ClientError>;
    async fn submit(&self, raw: &Bytes) -> Result<B256, ClientError>;
    async fn await_receipt(&self, hash: B256) -> Result<ConfirmedReceipt, ClientError>;
    async fn read_call(&self, data: Bytes) -> Result<Bytes, ClientError>;
}
