//! The bank contract: call encoding and event decoding.

use alloy::{
    network::TransactionBuilder as _,
    primitives::{Address, U256},
    rpc::types::TransactionRequest,
    sol,
    sol_types::{SolCall, SolEvent},
};

use crate::{chains::ChainDescriptor, wallet::Confirmation};

sol! {
    interface IBank {
        function bank() external payable;
        event SentToBank(address indexed sender, uint256 amount);
    }
}

/// The amount sent with every bank call: 0.0001 ether, in wei.
pub const BANK_AMOUNT: U256 = U256::from_limbs([100_000_000_000_000, 0, 0, 0]);

/// Build the `bank()` call from `from` against the contract on `chain`.
pub fn bank_call(chain: &ChainDescriptor, from: Address) -> TransactionRequest {
    TransactionRequest::default()
        .with_from(from)
        .with_to(chain.contract_address)
        .with_value(BANK_AMOUNT)
        .with_input(IBank::bankCall {}.abi_encode())
        .with_chain_id(chain.chain_id)
}

/// The total banked by `sender` according to the `SentToBank` events `contract` emitted in `confirmation`, if it
/// emitted any.
pub fn banked_amount(
    confirmation: &Confirmation,
    contract: Address,
    sender: Address,
) -> Option<U256> {
    confirmation
        .logs
        .iter()
        .filter(|log| log.address == contract)
        .filter_map(|log| IBank::SentToBank::decode_log_data(&log.data).ok())
        .filter(|event| event.sender == sender)
        .map(|event| event.amount)
        .reduce(|a, b| a.saturating_add(b))
}
