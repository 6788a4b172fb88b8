use alloy::primitives::{Bytes, U256};

use super::{
    contract::BillingCall, ClientError, ConfirmedReceipt, LedgerClient, LedgerError,
    SubmissionStep,
};

/// Drives one state-mutating contract call through the fixed step chain:
/// encode, estimate gas, fetch gas price, fetch nonce, sign, submit, await
/// receipt. The first failing step aborts the whole chain; callers see which
/// one through [`LedgerError::Step`]. Nothing durable is consumed before the
/// submit step, so an aborted chain leaves the ledger untouched.
pub async fn submit_call(
    client: &dyn LedgerClient,
    call: BillingCall,
    value: U256,
) -> Result<ConfirmedReceipt, LedgerError> {
    use SubmissionStep::*;

    // Encoding is local and cannot fail for this fixed ABI.
    let data: Bytes = call.abi_encode();

    let gas_limit = client
        .estimate_gas(&data, value)
        .await
        .map_err(|e| step(EstimateGas, e))?;
    let gas_price = client.gas_price().await.map_err(|e| step(FetchGasPrice, e))?;
    let nonce = client
        .transaction_count()
        .await
        .map_err(|e| step(FetchNonce, e))?;

    let plan = super::TxPlan {
        data,
        value,
        gas_limit,
        gas_price,
        nonce,
    };
    let raw = client
        .sign_transaction(&plan)
        .await
        .map_err(|e| step(Sign, e))?;
    let hash = client.submit(&raw).await.map_err(|e| step(Submit, e))?;
    let receipt = client
        .await_receipt(hash)
        .await
        .map_err(|e| step(AwaitReceipt, e))?;

    if !receipt.success {
        return Err(LedgerError::Reverted(hash));
    }
    Ok(receipt)
}

fn step(step: SubmissionStep, source: ClientError) -> LedgerError {
    LedgerError::Step { step, source }
}
