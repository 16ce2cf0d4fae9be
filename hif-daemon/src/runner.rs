//! Scripted session against the mock firmware: bring up two interfaces,
//! scan, listen, join the strongest network, install keys, poll
//! statistics, then tear everything down.

use anyhow::{Context, Result, bail};
use hif_core::Wilc;
use hif_core::bss::{BssInfo, CryptoSettings, parse_join_bss_param};
use hif_core::config::HifConfig;
use hif_core::events::RcvdNetInfo;
use hif_core::hif::{ConnEvent, ConnectParams, ConnectResult, MacStatus, OpMode, ScanEvent, ScanRequest};
use hif_core::transports::mock::{self, MockTransport, RecordingNotifier};
use hif_core::wid::WidId;
use hif_core::wid::records::KeyMaterial;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const HOME_AP: [u8; 6] = [0x02, 0x1A, 0x11, 0x00, 0x00, 0x01];
const CAFE_AP: [u8; 6] = [0x02, 0x1A, 0x11, 0x00, 0x00, 0x02];

fn channel_to_freq(ch: u8) -> u32 {
    2407 + 5 * u32::from(ch)
}

pub async fn run_session(transport: Arc<MockTransport>, config: HifConfig) -> Result<()> {
    let notifier = Arc::new(RecordingNotifier::default());
    let stats_period = config.stats_period;
    let wilc = Wilc::new(transport.clone(), notifier.clone(), config);

    let sta = wilc.add_interface("wlan0").await?;
    let p2p = wilc.add_interface("p2p0").await?;
    transport.set_response(WidId::MAC_ADDR, vec![0x02, 0x00, 0x00, 0xAA, 0xBB, 0xCC]);
    let mac = sta.get_mac_address().await?;
    sta.set_operation_mode(0, OpMode::Station, sta.idx()).await?;
    p2p.set_operation_mode(1, OpMode::Client, p2p.idx()).await?;
    tracing::info!(iface = sta.name(), ?mac, "📶 interfaces up");

    // --- 扫描 ---
    let found: Arc<Mutex<Vec<RcvdNetInfo>>> = Arc::default();
    let sink = found.clone();
    let (done_tx, done_rx) = oneshot::channel();
    let mut done_tx = Some(done_tx);
    sta.scan(
        ScanRequest { channels: (1..=11).collect(), ..Default::default() },
        Box::new(move |evt: ScanEvent, info: Option<&RcvdNetInfo>| match (evt, info) {
            (ScanEvent::NetworkFound, Some(info)) => {
                sink.lock().unwrap_or_else(PoisonError::into_inner).push(info.clone());
            }
            (ScanEvent::NetworkFound, None) => {}
            (evt, _) => {
                if let Some(tx) = done_tx.take() {
                    let _ = tx.send(evt);
                }
            }
        }),
    )
    .await?;

    for (bssid, ssid, ch, rssi) in [(HOME_AP, &b"home"[..], 6, -48), (CAFE_AP, &b"cafe"[..], 11, -71)] {
        let beacon = mock::beacon_frame(bssid, ssid, ch);
        wilc.frame_received(&mock::network_info_frame(sta.wire_idx(), rssi, &beacon))
            .await;
    }
    wilc.frame_received(&mock::scan_complete_frame(sta.wire_idx())).await;
    let outcome = done_rx.await.context("scan callback dropped")?;

    let best = {
        let found = found.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(?outcome, networks = found.len(), "scan finished");
        found.iter().max_by_key(|n| n.rssi).cloned()
    }
    .context("no networks found")?;

    // --- P2P 监听 ---
    let (roc_tx, roc_rx) = oneshot::channel();
    p2p.remain_on_channel(
        1,
        200,
        6,
        Box::new(move |cookie: u64| {
            let _ = roc_tx.send(cookie);
        }),
    )
    .await?;
    let cookie = roc_rx.await.context("listen period never ended")?;
    tracing::info!(iface = p2p.name(), cookie, "listen period over");

    // --- 连接 ---
    let bssid = best.bssid().context("scan result without bssid")?;
    let ies = best.ies().context("scan result is not a beacon")?;
    let bss = BssInfo {
        bssid,
        center_freq: channel_to_freq(best.ch),
        beacon_interval: 100,
        capability: 0x0411,
        tsf: 0,
        ies,
    };
    let join = parse_join_bss_param(&bss, &CryptoSettings::default());
    tracing::info!(ssid = %String::from_utf8_lossy(&join.ssid), ch = join.ch, "joining");

    transport.set_response(WidId::ASSOC_RES_INFO, mock::assoc_resp_info(0, &[]));
    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
    sta.set_join_req(
        ConnectParams { bssid, join, ..Default::default() },
        Box::new(move |evt: ConnEvent, mac: MacStatus, res: &ConnectResult<'_>| {
            let _ = conn_tx.send((evt, mac, res.status));
        }),
    )
    .await?;
    wilc.frame_received(&mock::async_info_frame(sta.wire_idx(), 1)).await;
    match conn_rx.recv().await {
        Some((ConnEvent::ConnResp, MacStatus::Connected, 0)) => tracing::info!(?bssid, "✅ associated"),
        other => bail!("join failed: {other:?}"),
    }

    // --- 密钥 ---
    let ptk = [0x11u8; 16];
    sta.add_ptk(&KeyMaterial::new(&ptk), &bssid, OpMode::Station, 0, 0).await?;
    let gtk = [0x22u8; 16];
    sta.add_rx_gtk(&KeyMaterial::new(&gtk), 1, None, OpMode::Station, 0).await?;

    // --- 统计 ---
    transport.set_response(WidId::LINKSPEED, vec![65]);
    transport.set_response(WidId::RSSI, vec![best.rssi as u8]);
    tokio::time::sleep(stats_period + Duration::from_millis(100)).await;
    wilc.flush().await?;
    let stats = sta.periodic_stats();
    transport.set_response(WidId::TX_POWER, vec![18]);
    let tx_power = sta.get_tx_power().await?;
    tracing::info!(link_speed = stats.link_speed, rssi = stats.rssi, tx_power, "link statistics");
    sta.set_antenna(1).await?;

    // --- 断开并关闭 ---
    sta.disconnect().await?;
    if let Some((evt, mac, _)) = conn_rx.recv().await {
        tracing::info!(?evt, ?mac, "disconnected");
    }
    wilc.shutdown().await?;
    tracing::info!(
        exchanges = transport.exchanges().len(),
        tcp_ack = ?notifier.tcp_ack_toggles(),
        "session complete"
    );
    Ok(())
}
