use crate::wid::Wid;
use crate::wid::frame::CfgOp;
use crate::wid::records::ETH_ALEN;
use async_trait::async_trait;

// 在这里定义核心与外部协作者之间的接口。

/// The physical link to the chip (SPI/SDIO).
/// 传输层接口：把一组 WID 发给固件并等待往返完成。
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one config exchange for the interface with wire index `vif_idx`.
    ///
    /// For [`CfgOp::Get`] each descriptor's value is overwritten with the
    /// firmware's answer and shrunk to the returned length.
    async fn send_config_packet(
        &self,
        vif_idx: u8,
        op: CfgOp,
        wids: &mut [Wid],
    ) -> crate::Result<()>;
}

/// SAE handshake request forwarded to user space.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExternalAuthRequest {
    pub bssid: [u8; ETH_ALEN],
    pub ssid: Vec<u8>,
    pub key_mgmt_suite: u32,
}

/// 网络栈一侧的通知接口
/// Notifications the core pushes to the network-stack glue.
#[async_trait]
pub trait StackNotifier: Send + Sync {
    /// Ask the supplicant to run SAE. The connect sequence does not wait on the outcome.
    async fn external_auth_request(
        &self,
        vif_idx: u8,
        req: &ExternalAuthRequest,
    ) -> crate::Result<()>;

    /// Turn the TCP-ACK filtering heuristic on or off.
    async fn enable_tcp_ack_filter(&self, vif_idx: u8, enabled: bool);
}

/// Notifier that ignores everything.
#[derive(Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl StackNotifier for NullNotifier {
    async fn external_auth_request(&self, _vif_idx: u8, _req: &ExternalAuthRequest) -> crate::Result<()> {
        Ok(())
    }

    async fn enable_tcp_ack_filter(&self, _vif_idx: u8, _enabled: bool) {}
}
