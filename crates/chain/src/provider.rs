//! Read-only access to the options protocol contracts.
//! Uses Alloy providers for type-safe RPC interactions.

use crate::contracts::{
    IExchange, ILendingPoolAddressesProvider, IMarketMaker, IMoret, IMoretBroker, IOptionVault,
    IVolatilityChain, OptionOrder, IERC20,
};
use alloy::primitives::{Address, I256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use tracing::{debug, info};

/// Token pair a market maker hedges with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketTokens {
    pub underlying: Address,
    pub funding: Address,
}

/// Signed loan and collateral deltas from `calcHedgeTradesForLoans`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanTrades {
    pub loan_amount: I256,
    pub collateral_amount: I256,
    /// Token approved to the pool when repaying
    pub loan_token: Address,
    /// Token approved to the pool when withdrawing
    pub collateral_token: Address,
}

impl LoanTrades {
    pub fn is_empty(&self) -> bool {
        self.loan_amount.is_zero() && self.collateral_amount.is_zero()
    }
}

/// Signed token deltas from `calcHedgeTradesForSwaps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapTrades {
    pub underlying_amount: I256,
    pub funding_amount: I256,
}

/// Lending pool resolved for a market maker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendingPoolRef {
    pub pool: Address,
    pub rate_mode: U256,
}

/// Contracts behind an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeContracts {
    pub market: Address,
    pub vault: Address,
}

/// Oracle and option pools of one underlying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionMarket {
    pub volatility_chain: Address,
    /// Pools in broker order
    pub pools: Vec<Address>,
}

/// Exchange price for an option order (all WAD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionQuote {
    pub premium: U256,
    pub collateral: U256,
    pub price: U256,
    pub volatility: U256,
}

/// Read-only protocol state.
#[async_trait]
pub trait ProtocolReader: Send + Sync + Debug {
    async fn market_tokens(&self, market: Address) -> Result<MarketTokens>;

    async fn loan_trades(&self, market: Address) -> Result<LoanTrades>;

    async fn swap_trades(&self, market: Address) -> Result<SwapTrades>;

    /// Pool from the market's addresses provider, plus the market's rate mode.
    async fn lending_pool(&self, market: Address) -> Result<LendingPoolRef>;

    /// Swap slippage tolerance as a WAD fraction.
    async fn swap_slippage(&self, market: Address) -> Result<U256>;

    async fn exchange_contracts(&self, exchange: Address) -> Result<ExchangeContracts>;

    async fn any_option_expiring(&self, vault: Address) -> Result<bool>;

    async fn capital(&self, market: Address, net: bool, average: bool) -> Result<U256>;

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256>;

    async fn token_symbol(&self, token: Address) -> Result<String>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;

    /// Funding token of the registry's broker.
    async fn broker_funding(&self, registry: Address) -> Result<Address>;

    /// Volatility chain and broker pools for an underlying token.
    async fn option_market(&self, registry: Address, token: Address) -> Result<OptionMarket>;

    /// Spot price (WAD) from a volatility chain.
    async fn spot_price(&self, volatility_chain: Address) -> Result<U256>;

    /// Price a purchase of `order` on the exchange.
    async fn quote_option(&self, exchange: Address, order: &OptionOrder) -> Result<OptionQuote>;
}

/// [`ProtocolReader`] over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct ChainReader {
    rpc_url: String,
}

impl ChainReader {
    /// Create a reader and verify the endpoint answers.
    pub async fn new(rpc_url: &str) -> Result<Self> {
        let reader = Self::new_unchecked(rpc_url);
        let block = reader.block_number().await?;
        info!(block = block, "Provider connection verified");
        Ok(reader)
    }

    /// Create a reader without touching the network.
    pub fn new_unchecked(rpc_url: &str) -> Self {
        Self {
            rpc_url: rpc_url.to_string(),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub async fn block_number(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(provider.get_block_number().await?)
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(provider.get_chain_id().await?)
    }

    /// Check the node answers and matches the expected chain.
    pub async fn health_check(&self, expected_chain_id: u64) -> Result<bool> {
        let (block, chain_id) = tokio::try_join!(self.block_number(), self.chain_id())?;
        if chain_id != expected_chain_id {
            anyhow::bail!(
                "RPC endpoint is on chain {}, expected {}",
                chain_id,
                expected_chain_id
            );
        }
        debug!(block = block, chain_id = chain_id, "Provider health check passed");
        Ok(block > 0)
    }
}

#[async_trait]
impl ProtocolReader for ChainReader {
    async fn market_tokens(&self, market: Address) -> Result<MarketTokens> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let contract = IMarketMaker::new(market, &provider);

        let underlying_call = contract.underlyingAddress();
        let funding_call = contract.fundingAddress();
        let (underlying, funding) = tokio::join!(underlying_call.call(), funding_call.call());

        Ok(MarketTokens {
            underlying: underlying.context("underlyingAddress() failed")?.underlying,
            funding: funding.context("fundingAddress() failed")?.funding,
        })
    }

    async fn loan_trades(&self, market: Address) -> Result<LoanTrades> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let result = IMarketMaker::new(market, &provider)
            .calcHedgeTradesForLoans()
            .call()
            .await
            .context("calcHedgeTradesForLoans() failed")?;

        let trades = LoanTrades {
            loan_amount: result.loanAmount,
            collateral_amount: result.collateralAmount,
            loan_token: result.loanAddress,
            collateral_token: result.collateralAddress,
        };
        debug!(
            market = %market,
            loan = %trades.loan_amount,
            collateral = %trades.collateral_amount,
            "Loan trades read"
        );
        Ok(trades)
    }

    async fn swap_trades(&self, market: Address) -> Result<SwapTrades> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let result = IMarketMaker::new(market, &provider)
            .calcHedgeTradesForSwaps()
            .call()
            .await
            .context("calcHedgeTradesForSwaps() failed")?;

        let trades = SwapTrades {
            underlying_amount: result.underlyingAmount,
            funding_amount: result.fundingAmount,
        };
        debug!(
            market = %market,
            underlying = %trades.underlying_amount,
            funding = %trades.funding_amount,
            "Swap trades read"
        );
        Ok(trades)
    }

    async fn lending_pool(&self, market: Address) -> Result<LendingPoolRef> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let contract = IMarketMaker::new(market, &provider);

        let provider_call = contract.aaveAddressProviderAddress();
        let rate_call = contract.lendingPoolRateMode();
        let (addresses_provider, rate_mode) = tokio::join!(provider_call.call(), rate_call.call());
        let addresses_provider = addresses_provider
            .context("aaveAddressProviderAddress() failed")?
            .provider;
        let rate_mode = rate_mode.context("lendingPoolRateMode() failed")?.rateMode;

        let pool = ILendingPoolAddressesProvider::new(addresses_provider, &provider)
            .getLendingPool()
            .call()
            .await
            .context("getLendingPool() failed")?
            .pool;

        debug!(market = %market, pool = %pool, rate_mode = %rate_mode, "Lending pool resolved");
        Ok(LendingPoolRef { pool, rate_mode })
    }

    async fn swap_slippage(&self, market: Address) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(IMarketMaker::new(market, &provider)
            .swapSlippage()
            .call()
            .await
            .context("swapSlippage() failed")?
            .slippage)
    }

    async fn exchange_contracts(&self, exchange: Address) -> Result<ExchangeContracts> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let contract = IExchange::new(exchange, &provider);

        let market_call = contract.marketMakerAddress();
        let vault_call = contract.vaultAddress();
        let (market, vault) = tokio::join!(market_call.call(), vault_call.call());

        Ok(ExchangeContracts {
            market: market.context("marketMakerAddress() failed")?.marketMaker,
            vault: vault.context("vaultAddress() failed")?.vault,
        })
    }

    async fn any_option_expiring(&self, vault: Address) -> Result<bool> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(IOptionVault::new(vault, &provider)
            .anyOptionExpiring()
            .call()
            .await
            .context("anyOptionExpiring() failed")?
            .expiring)
    }

    async fn capital(&self, market: Address, net: bool, average: bool) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(IMarketMaker::new(market, &provider)
            .calcCapital(net, average)
            .call()
            .await
            .context("calcCapital() failed")?
            .capital)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(IERC20::new(token, &provider)
            .balanceOf(owner)
            .call()
            .await
            .context("balanceOf() failed")?
            .balance)
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(IERC20::new(token, &provider)
            .symbol()
            .call()
            .await
            .context("symbol() failed")?
            .symbol)
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(IERC20::new(token, &provider)
            .allowance(owner, spender)
            .call()
            .await
            .context("allowance() failed")?
            .remaining)
    }

    async fn broker_funding(&self, registry: Address) -> Result<Address> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let broker = IMoret::new(registry, &provider)
            .broker()
            .call()
            .await
            .context("broker() failed")?
            .broker;
        Ok(IMoretBroker::new(broker, &provider)
            .funding()
            .call()
            .await
            .context("funding() failed")?
            .funding)
    }

    async fn option_market(&self, registry: Address, token: Address) -> Result<OptionMarket> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let contract = IMoret::new(registry, &provider);

        let broker_call = contract.broker();
        let chain_call = contract.getVolatilityChain(token);
        let (broker, volatility_chain) = tokio::join!(broker_call.call(), chain_call.call());
        let broker = broker.context("broker() failed")?.broker;
        let volatility_chain = volatility_chain
            .context("getVolatilityChain() failed")?
            .volatilityChain;

        let pools = IMoretBroker::new(broker, &provider)
            .getAllPools(token)
            .call()
            .await
            .context("getAllPools() failed")?
            .pools;

        debug!(
            token = %token,
            volatility_chain = %volatility_chain,
            pools = pools.len(),
            "Option market resolved"
        );
        Ok(OptionMarket {
            volatility_chain,
            pools,
        })
    }

    async fn spot_price(&self, volatility_chain: Address) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(IVolatilityChain::new(volatility_chain, &provider)
            .queryPrice()
            .call()
            .await
            .context("queryPrice() failed")?
            .price)
    }

    async fn quote_option(&self, exchange: Address, order: &OptionOrder) -> Result<OptionQuote> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let result = IExchange::new(exchange, &provider)
            .queryOption(
                order.pool,
                U256::from(order.tenor),
                order.strike,
                order.amount,
                order.option_type.code(),
                order.payment_method,
                false,
            )
            .call()
            .await
            .context("queryOption() failed")?;

        Ok(OptionQuote {
            premium: result.premium,
            collateral: result.collateral,
            price: result.price,
            volatility: result.volatility,
        })
    }
}
