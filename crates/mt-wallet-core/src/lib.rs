use mt_api_types::{ContractAddress, WalletAddress};
use mt_chain_client::{MintContract, ProviderError, WalletProvider};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// How a session is established when the application starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPolicy {
    /// Reuse an already-authorized account without prompting.
    RestoreOnStartup,
    /// Stay disconnected until `connect` is called.
    ExplicitConnect,
}

impl BootstrapPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "restore" | "restore_on_startup" => Some(Self::RestoreOnStartup),
            "explicit" | "explicit_connect" => Some(Self::ExplicitConnect),
            _ => None,
        }
    }
}

/// An authorized account together with the contract handle bound to its signer.
#[derive(Clone)]
pub struct ConnectedWallet {
    pub address: WalletAddress,
    pub contract: MintContract,
}

pub struct WalletSession {
    provider: Option<Arc<dyn WalletProvider>>,
    contract_address: ContractAddress,
    connected: RwLock<Option<ConnectedWallet>>,
    connecting: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl WalletSession {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>, contract_address: ContractAddress) -> Self {
        Self {
            provider,
            contract_address,
            connected: RwLock::new(None),
            connecting: AtomicBool::new(false),
        }
    }

    pub fn contract_address(&self) -> &ContractAddress {
        &self.contract_address
    }

    fn provider(&self) -> Result<Arc<dyn WalletProvider>, ProviderError> {
        self.provider.clone().ok_or(ProviderError::ProviderAbsent)
    }

    /// Prompts the provider for account access and binds the contract handle.
    ///
    /// A second call while the first is still waiting on the provider fails with
    /// `ConnectionPending` and does not reach the provider.
    pub async fn connect(&self) -> Result<WalletAddress, ProviderError> {
        let provider = self.provider()?;

        if self.connecting.swap(true, Ordering::AcqRel) {
            warn!("wallet connect requested while another request is pending");
            return Err(ProviderError::ConnectionPending);
        }
        let _in_flight = InFlight(&self.connecting);

        let accounts = provider.request_accounts().await?;
        let Some(address) = accounts.into_iter().next() else {
            return Err(ProviderError::UserRejected(
                "wallet returned no accounts".to_owned(),
            ));
        };

        self.bind(provider.as_ref(), &address).await;
        info!("wallet {} connected via {}", address, provider.name());
        Ok(address)
    }

    pub async fn current_accounts(&self) -> Result<Vec<WalletAddress>, ProviderError> {
        self.provider()?.accounts().await
    }

    /// Binds the first already-authorized account, if any, without prompting.
    pub async fn restore(&self) -> Result<Option<WalletAddress>, ProviderError> {
        let provider = self.provider()?;
        let Some(address) = provider.accounts().await?.into_iter().next() else {
            return Ok(None);
        };

        self.bind(provider.as_ref(), &address).await;
        info!("wallet {} restored via {}", address, provider.name());
        Ok(Some(address))
    }

    pub async fn bootstrap(&self, policy: BootstrapPolicy) -> Result<Option<WalletAddress>, ProviderError> {
        match policy {
            BootstrapPolicy::RestoreOnStartup => self.restore().await,
            BootstrapPolicy::ExplicitConnect => Ok(None),
        }
    }

    /// Forgets the local session. Authorization held by the wallet is untouched.
    pub async fn disconnect(&self) {
        let previous = self.connected.write().await.take();
        if let Some(wallet) = previous {
            info!("wallet {} disconnected", wallet.address);
        }
    }

    pub async fn current(&self) -> Option<ConnectedWallet> {
        self.connected.read().await.clone()
    }

    pub async fn address(&self) -> Option<WalletAddress> {
        self.connected
            .read()
            .await
            .as_ref()
            .map(|wallet| wallet.address.clone())
    }

    async fn bind(&self, provider: &dyn WalletProvider, address: &WalletAddress) {
        let contract = MintContract::new(self.contract_address.clone(), provider.signer(address));
        let mut guard = self.connected.write().await;
        *guard = Some(ConnectedWallet {
            address: address.clone(),
            contract,
        });
    }
}
