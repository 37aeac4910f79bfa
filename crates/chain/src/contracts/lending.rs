//! Lending pool interfaces (Aave V2 style).
//!
//! The market maker names an addresses provider; the pool itself is
//! resolved through `getLendingPool()` on every run.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

/// Referral code sent with deposits and borrows.
pub const REFERRAL_CODE: u16 = 0;

sol! {
    #[sol(rpc)]
    interface ILendingPoolAddressesProvider {
        function getLendingPool() external view returns (address pool);
    }

    #[sol(rpc)]
    interface ILendingPool {
        function deposit(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
        function borrow(address asset, uint256 amount, uint256 interestRateMode, uint16 referralCode, address onBehalfOf) external;
        function repay(address asset, uint256 amount, uint256 rateMode, address onBehalfOf) external returns (uint256);
        function withdraw(address asset, uint256 amount, address to) external returns (uint256);
    }
}

pub fn encode_deposit(asset: Address, amount: U256, on_behalf_of: Address) -> Bytes {
    ILendingPool::depositCall {
        asset,
        amount,
        onBehalfOf: on_behalf_of,
        referralCode: REFERRAL_CODE,
    }
    .abi_encode()
    .into()
}

pub fn encode_borrow(asset: Address, amount: U256, rate_mode: U256, on_behalf_of: Address) -> Bytes {
    ILendingPool::borrowCall {
        asset,
        amount,
        interestRateMode: rate_mode,
        referralCode: REFERRAL_CODE,
        onBehalfOf: on_behalf_of,
    }
    .abi_encode()
    .into()
}

pub fn encode_repay(asset: Address, amount: U256, rate_mode: U256, on_behalf_of: Address) -> Bytes {
    ILendingPool::repayCall {
        asset,
        amount,
        rateMode: rate_mode,
        onBehalfOf: on_behalf_of,
    }
    .abi_encode()
    .into()
}

pub fn encode_withdraw(asset: Address, amount: U256, to: Address) -> Bytes {
    ILendingPool::withdrawCall { asset, amount, to }.abi_encode().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aave_v2_selectors() {
        // Selectors of the Aave V2 LendingPool
        assert_eq!(hex::encode(ILendingPool::depositCall::SELECTOR), "e8eda9df");
        assert_eq!(hex::encode(ILendingPool::borrowCall::SELECTOR), "a415bcad");
        assert_eq!(hex::encode(ILendingPool::repayCall::SELECTOR), "573ade81");
        assert_eq!(hex::encode(ILendingPool::withdrawCall::SELECTOR), "69328dec");
    }

    #[test]
    fn test_encode_borrow_fields() {
        let asset = Address::repeat_byte(0xaa);
        let market = Address::repeat_byte(0xbb);
        let calldata = encode_borrow(asset, U256::from(42u64), U256::from(2u64), market);

        let decoded = ILendingPool::borrowCall::abi_decode(&calldata, true).unwrap();
        assert_eq!(decoded.asset, asset);
        assert_eq!(decoded.amount, U256::from(42u64));
        assert_eq!(decoded.interestRateMode, U256::from(2u64));
        assert_eq!(decoded.referralCode, REFERRAL_CODE);
        assert_eq!(decoded.onBehalfOf, market);
    }
}
