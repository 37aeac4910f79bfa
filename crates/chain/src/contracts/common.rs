//! Common contract interfaces shared across the protocol contracts.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

// ERC20 subset for balances and the keeper's own approvals
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256 balance);
        function symbol() external view returns (string symbol);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
        function approve(address spender, uint256 amount) external returns (bool success);
    }
}

/// Encode `approve(spender, amount)` on an ERC20 token.
pub fn encode_approve(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erc20_selectors() {
        assert_eq!(hex::encode(IERC20::balanceOfCall::SELECTOR), "70a08231");
        assert_eq!(hex::encode(IERC20::symbolCall::SELECTOR), "95d89b41");
        assert_eq!(hex::encode(IERC20::allowanceCall::SELECTOR), "dd62ed3e");
        assert_eq!(hex::encode(IERC20::approveCall::SELECTOR), "095ea7b3");
    }

    #[test]
    fn test_encode_approve() {
        let spender = Address::repeat_byte(0x65);
        let calldata = encode_approve(spender, U256::MAX);
        let decoded = IERC20::approveCall::abi_decode(&calldata, true).unwrap();
        assert_eq!(decoded.spender, spender);
        assert_eq!(decoded.amount, U256::MAX);
    }
}
