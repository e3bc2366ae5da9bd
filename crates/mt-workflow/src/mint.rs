use mt_api_types::MetadataUrl;
use mt_chain_client::TxReceipt;
use mt_wallet_core::WalletSession;
use tracing::info;

use crate::WorkflowError;

/// Submits `mint(metadata_url)` through the session's contract and waits for inclusion.
///
/// Both preconditions are checked before anything leaves the process, the
/// wallet first. The confirmation wait has no deadline.
pub async fn mint(
    session: &WalletSession,
    metadata_url: Option<&MetadataUrl>,
) -> Result<TxReceipt, WorkflowError> {
    let wallet = session.current().await.ok_or(WorkflowError::MissingWallet)?;
    let metadata_url = metadata_url.ok_or(WorkflowError::MissingMetadata)?;

    let pending = wallet.contract.mint(metadata_url).await?;
    let tx_hash = pending.tx_hash.clone();
    let receipt = pending.wait().await?;

    info!(
        "mint {} confirmed for {} in block {:?}",
        tx_hash, wallet.address, receipt.block_number
    );
    Ok(receipt)
}
