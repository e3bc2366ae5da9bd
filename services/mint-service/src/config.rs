use alloy_primitives::Address;
use mt_wallet_core::BootstrapPolicy;
use std::net::SocketAddr;
use std::time::Duration;

pub(crate) const DEFAULT_ADDR: &str = "0.0.0.0:8080";
pub(crate) const DEFAULT_CONTRACT_ADDRESS: &str = "0x184CE4383e9554356c4b66Ed7FB7d441DbD7e12E";

/// Settings read once at startup. Unset credentials stay `None` and surface
/// as configuration errors on the operations that need them.
#[derive(Debug, Clone)]
pub(crate) struct ServiceConfig {
    pub addr: SocketAddr,
    pub rpc_url: Option<String>,
    pub contract_address: String,
    pub receipt_poll_interval: Duration,
    pub bootstrap: BootstrapPolicy,
    pub image_api_url: Option<String>,
    pub image_api_key: Option<String>,
    pub storage_url: Option<String>,
    pub storage_api_key: Option<String>,
    pub gateway_base: String,
    pub chat_api_url: Option<String>,
    pub chat_api_key: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty());

        let addr = var("MINT_SERVICE_ADDR")
            .unwrap_or_else(|| DEFAULT_ADDR.to_owned())
            .parse::<SocketAddr>()
            .map_err(|err| anyhow::anyhow!("MINT_SERVICE_ADDR is not a socket address: {err}"))?;

        let receipt_poll_interval = match var("RECEIPT_POLL_INTERVAL_MS") {
            Some(raw) => Duration::from_millis(
                raw.parse::<u64>()
                    .map_err(|err| anyhow::anyhow!("RECEIPT_POLL_INTERVAL_MS must be milliseconds: {err}"))?,
            ),
            None => mt_chain_evm::DEFAULT_RECEIPT_POLL_INTERVAL,
        };

        let bootstrap = match var("WALLET_BOOTSTRAP") {
            Some(raw) => BootstrapPolicy::parse(&raw)
                .ok_or_else(|| anyhow::anyhow!("WALLET_BOOTSTRAP must be 'restore' or 'explicit', got '{raw}'"))?,
            None => BootstrapPolicy::RestoreOnStartup,
        };

        let contract_address = var("MINT_CONTRACT_ADDRESS").unwrap_or_else(|| DEFAULT_CONTRACT_ADDRESS.to_owned());
        contract_address
            .parse::<Address>()
            .map_err(|err| anyhow::anyhow!("MINT_CONTRACT_ADDRESS is not an address: {err}"))?;

        Ok(Self {
            addr,
            rpc_url: var("EVM_RPC_URL"),
            contract_address,
            receipt_poll_interval,
            bootstrap,
            image_api_url: var("IMAGE_API_URL"),
            image_api_key: var("IMAGE_API_KEY"),
            storage_url: var("NFT_STORAGE_URL"),
            storage_api_key: var("NFT_STORAGE_API_KEY"),
            gateway_base: var("IPFS_GATEWAY_BASE").unwrap_or_else(|| mt_storage::DEFAULT_GATEWAY_BASE.to_owned()),
            chat_api_url: var("GEMINI_API_URL"),
            chat_api_key: var("GEMINI_API_KEY"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<ServiceConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        ServiceConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() -> anyhow::Result<()> {
        let config = config(&[])?;
        assert_eq!(config.addr, DEFAULT_ADDR.parse::<SocketAddr>()?);
        assert_eq!(config.contract_address, DEFAULT_CONTRACT_ADDRESS);
        assert_eq!(config.receipt_poll_interval, Duration::from_millis(4000));
        assert_eq!(config.bootstrap, BootstrapPolicy::RestoreOnStartup);
        assert_eq!(config.gateway_base, "https://ipfs.io/ipfs");
        assert!(config.rpc_url.is_none());
        assert!(config.image_api_key.is_none());
        Ok(())
    }

    #[test]
    fn blank_values_count_as_unset() -> anyhow::Result<()> {
        let config = config(&[("NFT_STORAGE_API_KEY", "   "), ("GEMINI_API_KEY", "gem")])?;
        assert!(config.storage_api_key.is_none());
        assert_eq!(config.chat_api_key.as_deref(), Some("gem"));
        Ok(())
    }

    #[test]
    fn invalid_values_are_startup_errors() {
        assert!(config(&[("WALLET_BOOTSTRAP", "sometimes")]).is_err());
        assert!(config(&[("RECEIPT_POLL_INTERVAL_MS", "soon")]).is_err());
        assert!(config(&[("MINT_SERVICE_ADDR", "localhost")]).is_err());
        assert!(config(&[("MINT_CONTRACT_ADDRESS", "0xc0ffee")]).is_err());
    }

    #[test]
    fn contract_address_override_is_kept() -> anyhow::Result<()> {
        let config = config(&[("MINT_CONTRACT_ADDRESS", "0x5fbdb2315678afecb367f032d93f642f64180aa3")])?;
        assert_eq!(config.contract_address, "0x5fbdb2315678afecb367f032d93f642f64180aa3");
        Ok(())
    }

    #[test]
    fn explicit_bootstrap_is_accepted() -> anyhow::Result<()> {
        assert_eq!(
            config(&[("WALLET_BOOTSTRAP", "explicit")])?.bootstrap,
            BootstrapPolicy::ExplicitConnect
        );
        Ok(())
    }
}
