//! JSON ABI artifacts produced by the contract build.
//!
//! The build writes one `<Contract>.json` per contract with the ABI under
//! the `abi` key. The keeper does not encode from these files at runtime;
//! it loads them at startup and checks that every function it is going to
//! call exists in the deployed interface.

use alloy::json_abi::JsonAbi;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::common::IERC20;
use super::lending::{ILendingPool, ILendingPoolAddressesProvider};
use super::moret::{IExchange, IMarketMaker, IMoret, IMoretBroker, IOptionVault, IVolatilityChain};

/// Fallback directory, relative to the working directory.
pub const DEFAULT_FALLBACK_DIR: &str = "../build/contracts";

/// A function the keeper encodes: (signature, selector).
pub type RequiredFunction = (&'static str, [u8; 4]);

/// Contracts whose artifacts are checked at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    MarketMaker,
    Exchange,
    OptionVault,
    LendingPool,
    LendingPoolAddressesProvider,
    Registry,
    Broker,
    VolatilityChain,
    Erc20,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 9] = [
        ArtifactKind::MarketMaker,
        ArtifactKind::Exchange,
        ArtifactKind::OptionVault,
        ArtifactKind::LendingPool,
        ArtifactKind::LendingPoolAddressesProvider,
        ArtifactKind::Registry,
        ArtifactKind::Broker,
        ArtifactKind::VolatilityChain,
        ArtifactKind::Erc20,
    ];

    /// Artifact file name in the build directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::MarketMaker => "MoretMarketMaker.json",
            ArtifactKind::Exchange => "Exchange.json",
            ArtifactKind::OptionVault => "OptionVault.json",
            ArtifactKind::LendingPool => "ILendingPool.json",
            ArtifactKind::LendingPoolAddressesProvider => "ILendingPoolAddressesProvider.json",
            ArtifactKind::Registry => "Moret.json",
            ArtifactKind::Broker => "MoretBroker.json",
            ArtifactKind::VolatilityChain => "VolatilityChain.json",
            ArtifactKind::Erc20 => "ERC20.json",
        }
    }

    /// Functions the keeper calls on this contract.
    pub fn required_functions(&self) -> Vec<RequiredFunction> {
        fn f<C: SolCall>() -> RequiredFunction {
            (C::SIGNATURE, C::SELECTOR)
        }

        match self {
            ArtifactKind::MarketMaker => vec![
                f::<IMarketMaker::underlyingAddressCall>(),
                f::<IMarketMaker::fundingAddressCall>(),
                f::<IMarketMaker::aaveAddressProviderAddressCall>(),
                f::<IMarketMaker::lendingPoolRateModeCall>(),
                f::<IMarketMaker::swapSlippageCall>(),
                f::<IMarketMaker::calcHedgeTradesForLoansCall>(),
                f::<IMarketMaker::calcHedgeTradesForSwapsCall>(),
                f::<IMarketMaker::calcCapitalCall>(),
                f::<IMarketMaker::approveSpendingCall>(),
                f::<IMarketMaker::tradeCall>(),
                f::<IMarketMaker::expireOptionsCall>(),
            ],
            ArtifactKind::Exchange => vec![
                f::<IExchange::marketMakerAddressCall>(),
                f::<IExchange::vaultAddressCall>(),
                f::<IExchange::queryOptionCall>(),
                f::<IExchange::tradeOptionCall>(),
            ],
            ArtifactKind::OptionVault => vec![f::<IOptionVault::anyOptionExpiringCall>()],
            ArtifactKind::LendingPool => vec![
                f::<ILendingPool::depositCall>(),
                f::<ILendingPool::borrowCall>(),
                f::<ILendingPool::repayCall>(),
                f::<ILendingPool::withdrawCall>(),
            ],
            ArtifactKind::LendingPoolAddressesProvider => {
                vec![f::<ILendingPoolAddressesProvider::getLendingPoolCall>()]
            }
            ArtifactKind::Registry => vec![
                f::<IMoret::brokerCall>(),
                f::<IMoret::getVolatilityChainCall>(),
            ],
            ArtifactKind::Broker => vec![
                f::<IMoretBroker::fundingCall>(),
                f::<IMoretBroker::getAllPoolsCall>(),
            ],
            ArtifactKind::VolatilityChain => vec![f::<IVolatilityChain::queryPriceCall>()],
            ArtifactKind::Erc20 => vec![
                f::<IERC20::balanceOfCall>(),
                f::<IERC20::symbolCall>(),
                f::<IERC20::allowanceCall>(),
                f::<IERC20::approveCall>(),
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawArtifact {
    #[serde(rename = "contractName", default)]
    contract_name: Option<String>,
    abi: JsonAbi,
}

/// A parsed contract artifact.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    /// Contract name from the artifact (falls back to the file stem)
    pub name: String,
    pub abi: JsonAbi,
}

impl ContractArtifact {
    /// Parse an artifact from its JSON text.
    pub fn parse(json: &str, fallback_name: &str) -> Result<Self> {
        let raw: RawArtifact = serde_json::from_str(json).context("Invalid ABI artifact JSON")?;
        Ok(Self {
            name: raw.contract_name.unwrap_or_else(|| fallback_name.to_string()),
            abi: raw.abi,
        })
    }

    /// Required functions that are absent from this ABI.
    pub fn missing_functions(&self, required: &[RequiredFunction]) -> Vec<&'static str> {
        let present: HashSet<[u8; 4]> = self.abi.functions().map(|f| f.selector().0).collect();
        required
            .iter()
            .filter(|(_, selector)| !present.contains(selector))
            .map(|(signature, _)| *signature)
            .collect()
    }
}

/// Locates and loads artifacts from an ordered list of directories.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    search_dirs: Vec<PathBuf>,
}

impl ArtifactStore {
    /// Search `primary` first, then the fallback build directory.
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        Self {
            search_dirs: vec![primary.into(), PathBuf::from(DEFAULT_FALLBACK_DIR)],
        }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// First existing path for `file_name`.
    pub fn locate(&self, file_name: &str) -> Option<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| dir.join(file_name))
            .find(|path| path.is_file())
    }

    /// Load one artifact.
    pub fn load(&self, kind: ArtifactKind) -> Result<ContractArtifact> {
        let file_name = kind.file_name();
        let path = self.locate(file_name).ok_or_else(|| {
            anyhow::anyhow!(
                "Artifact {} not found in {:?}",
                file_name,
                self.search_dirs
            )
        })?;
        load_file(&path, file_name)
    }

    /// Load every artifact and fail on the first missing function.
    pub fn verify_all(&self) -> Result<Vec<ContractArtifact>> {
        let mut loaded = Vec::with_capacity(ArtifactKind::ALL.len());

        for kind in ArtifactKind::ALL {
            let artifact = self.load(kind)?;
            let missing = artifact.missing_functions(&kind.required_functions());
            if !missing.is_empty() {
                anyhow::bail!(
                    "{} ABI is missing functions the keeper calls: {}",
                    artifact.name,
                    missing.join(", ")
                );
            }
            debug!(
                contract = %artifact.name,
                functions = artifact.abi.functions().count(),
                "ABI artifact verified"
            );
            loaded.push(artifact);
        }

        info!(count = loaded.len(), "All ABI artifacts verified");
        Ok(loaded)
    }
}

fn load_file(path: &Path, file_name: &str) -> Result<ContractArtifact> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read artifact {}", path.display()))?;
    let stem = file_name.trim_end_matches(".json");
    ContractArtifact::parse(&content, stem)
        .with_context(|| format!("Failed to parse artifact {}", path.display()))
}
