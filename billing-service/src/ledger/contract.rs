use alloy::{
    primitives::{Bytes, U256},
    sol,
    sol_types::SolCall,
};

use super::LedgerError;

sol! {
    /// On-chain billing surface. The contract itself is deployed separately;
    /// this service only knows its address and this ABI.
    interface EnergyBilling {
        function storeEnergy(uint256 totalEnergy) external;
        function getBill() external view returns (uint256);
        function payBill() external payable;
    }
}

/// A state-mutating invocation the session can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingCall {
    StoreEnergy { total_kwh: u64 },
    PayBill,
}

impl BillingCall {
    pub fn abi_encode(&self) -> Bytes {
        match self {
            Self::StoreEnergy { total_kwh } => EnergyBilling::storeEnergyCall {
                totalEnergy: U256::from(*total_kwh),
            }
            .abi_encode()
            .into(),
            Self::PayBill => EnergyBilling::payBillCall {}.abi_encode().into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::StoreEnergy { .. } => "store_energy",
            Self::PayBill => "pay_bill",
        }
    }
}

pub fn encode_get_bill() -> Bytes {
    EnergyBilling::getBillCall {}.abi_encode().into()
}

pub fn decode_bill(data: &[u8]) -> Result<U256, LedgerError> {
    EnergyBilling::getBillCall::abi_decode_returns(data)
        .map_err(|e| LedgerError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolValue;

    #[test]
    fn store_energy_carries_the_truncated_quantity() {
        let data = BillingCall::StoreEnergy { total_kwh: 42 }.abi_encode();
        let decoded = EnergyBilling::storeEnergyCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.totalEnergy, U256::from(42));
    }

    #[test]
    fn bill_return_data_decodes_to_the_amount() {
        let encoded = U256::from(500).abi_encode();
        let bill = decode_bill(&encoded).unwrap();
        assert_eq!(bill, U256::from(500));
    }

    #[test]
    fn garbage_return_data_is_a_decode_error() {
        let res = decode_bill(&[0xde, 0xad]);
        assert!(matches!(res, Err(LedgerError::Decode(_))));
    }
}
