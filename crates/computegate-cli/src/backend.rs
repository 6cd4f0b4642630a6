//! Backend construction from configuration

use anyhow::Context;

use computegate_chain::{ChainBackend, InMemoryLedger};
use computegate_evm::{EvmBackend, EvmConfig};
use computegate_solana::{SolanaBackend, SolanaConfig};
use computegate_types::Identity;

use crate::config::ChainSettings;

/// A ready backend plus the address it signs with, when it signs at all
pub struct Backend {
    pub chain: Box<dyn ChainBackend>,
    pub signer: Option<String>,
}

pub async fn build(settings: &ChainSettings) -> anyhow::Result<Backend> {
    match settings {
        ChainSettings::Solana(solana) => {
            let credential = solana
                .credential
                .load()
                .context("loading the Solana signing key")?;
            let mut config = SolanaConfig::new(&solana.rpc_url, &solana.mint);
            config.token_program = solana.token_program.clone();
            config.treasury_owner = solana.treasury.clone();
            config.commitment = solana.commitment;
            config.timeouts = solana.timeouts.backend_timeouts();

            let backend = SolanaBackend::new(config, credential)?;
            let signer = backend.authority().to_string();
            Ok(Backend {
                chain: Box::new(backend),
                signer: Some(signer),
            })
        }
        ChainSettings::Evm(evm) => {
            let credential = evm
                .credential
                .load()
                .context("loading the EVM signing key")?;
            let mut config = EvmConfig::new(&evm.rpc_url, &evm.token);
            config.treasury = evm.treasury.clone();
            config.chain_id = evm.chain_id;
            config.gas_limit = evm.gas_limit;
            config.block_tag = evm.block_tag;
            config.confirmations = evm.confirmations;
            config.timeouts = evm.timeouts.backend_timeouts();

            let backend = EvmBackend::new(config, credential)?;
            let signer = backend.sender().to_checksum();
            Ok(Backend {
                chain: Box::new(backend),
                signer: Some(signer),
            })
        }
        ChainSettings::Memory(memory) => {
            let ledger = InMemoryLedger::new(memory.treasury.as_str());
            for opening in &memory.balances {
                let holder = Identity::new(opening.holder.as_str());
                ledger
                    .validate_identity(&holder)
                    .with_context(|| format!("opening balance for {:?}", opening.holder))?;
                ledger.set_balance(holder, opening.amount).await;
            }
            tracing::warn!(
                treasury = %memory.treasury,
                holders = memory.balances.len(),
                "using the in-memory ledger; nothing is settled on-chain"
            );
            Ok(Backend {
                chain: Box::new(ledger),
                signer: None,
            })
        }
    }
}
