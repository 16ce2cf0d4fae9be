//! Command dispatcher: the single path from a WID list to the transport.

use crate::traits::Transport;
use crate::wid::Wid;
use crate::wid::frame::CfgOp;
use std::sync::Arc;

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// SET every attribute in `wids`.
    pub async fn set(&self, vif_idx: u8, wids: &mut [Wid]) -> crate::Result<()> {
        self.send(vif_idx, CfgOp::Set, wids).await
    }

    /// GET every attribute in `wids`; values are filled in place.
    pub async fn get(&self, vif_idx: u8, wids: &mut [Wid]) -> crate::Result<()> {
        self.send(vif_idx, CfgOp::Get, wids).await
    }

    async fn send(&self, vif_idx: u8, op: CfgOp, wids: &mut [Wid]) -> crate::Result<()> {
        if wids.is_empty() {
            return Ok(());
        }
        tracing::trace!(
            vif = vif_idx,
            ?op,
            wids = ?wids.iter().map(|w| w.id).collect::<Vec<_>>(),
            "dispatching config packet"
        );
        self.transport
            .send_config_packet(vif_idx, op, wids)
            .await
            .inspect_err(|e| {
                tracing::error!(vif = vif_idx, ?op, first = ?wids.first().map(|w| w.id), "config packet failed: {}", e)
            })
    }
}
