use super::*;
use crate::config::{AntennaConfig, AntennaSwitchMode};
use crate::transports::mock::{self, MockTransport, RecordingNotifier};
use crate::wid::WidId;
use crate::wid::records::{KeyMaterial, JoinBssParam, WLAN_STATUS_UNSPECIFIED_FAILURE, encode_antenna, encode_gtk};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::time::sleep;

const BSSID: [u8; 6] = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];

struct Rig {
    wilc: Wilc,
    vifs: Vec<Arc<Vif>>,
    transport: Arc<MockTransport>,
    notifier: Arc<RecordingNotifier>,
}

fn quiet_config() -> HifConfig {
    HifConfig {
        stats_period: Duration::from_secs(3600),
        ..HifConfig::default()
    }
}

async fn rig_with(config: HifConfig, interfaces: usize) -> Rig {
    let transport = Arc::new(MockTransport::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let wilc = Wilc::new(transport.clone(), notifier.clone(), config);
    let mut vifs = Vec::new();
    for i in 0..interfaces {
        vifs.push(wilc.add_interface(&format!("wlan{i}")).await.unwrap());
    }
    Rig { wilc, vifs, transport, notifier }
}

async fn rig(interfaces: usize) -> Rig {
    rig_with(quiet_config(), interfaces).await
}

type Log<T> = Arc<StdMutex<Vec<T>>>;

fn scan_log() -> (Log<ScanEvent>, ScanResultFn) {
    let log: Log<ScanEvent> = Arc::default();
    let sink = log.clone();
    let cb: ScanResultFn = Box::new(move |evt: ScanEvent, _: Option<&RcvdNetInfo>| {
        sink.lock().unwrap().push(evt);
    });
    (log, cb)
}

/// Records `(event, mac status, status code, response IEs)`.
fn conn_log() -> (Log<(ConnEvent, MacStatus, u16, Vec<u8>)>, ConnResultFn) {
    let log: Log<(ConnEvent, MacStatus, u16, Vec<u8>)> = Arc::default();
    let sink = log.clone();
    let cb: ConnResultFn = Box::new(move |evt: ConnEvent, mac: MacStatus, res: &ConnectResult<'_>| {
        sink.lock().unwrap().push((evt, mac, res.status, res.resp_ies.to_vec()));
    });
    (log, cb)
}

fn connect_params() -> ConnectParams {
    ConnectParams {
        bssid: BSSID,
        req_ies: vec![0x30, 0x02, 0x01, 0x00],
        security: 0x31,
        join: JoinBssParam {
            ssid: b"lab".to_vec(),
            ch: 6,
            bssid: BSSID,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Joins `vif` and lets the firmware accept it.
async fn connect(rig: &Rig, vif: &Vif) -> Log<(ConnEvent, MacStatus, u16, Vec<u8>)> {
    rig.transport
        .set_response(WidId::ASSOC_RES_INFO, mock::assoc_resp_info(0, &[0xDD, 0x01, 0x07]));
    let (log, cb) = conn_log();
    vif.set_join_req(connect_params(), cb).await.unwrap();
    rig.wilc
        .gnrl_async_info_received(&mock::async_info_frame(vif.wire_idx(), 1))
        .await;
    rig.wilc.flush().await.unwrap();
    log
}

#[tokio::test]
async fn scan_sends_parameters_in_order() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let (_log, cb) = scan_log();
    let req = ScanRequest {
        channels: vec![1, 6, 11],
        ssids: vec![b"home".to_vec(), b"office12".to_vec()],
        ies: vec![0xDD, 0x00],
        ..Default::default()
    };
    vif.scan(req, cb).await.unwrap();

    assert_eq!(
        rig.transport.sent_ids(),
        vec![
            WidId::SSID_PROBE_REQ,
            WidId::INFO_ELEMENT_PROBE,
            WidId::SCAN_TYPE,
            WidId::SCAN_CHANNEL_LIST,
            WidId::START_SCAN_REQ,
        ]
    );
    let ssids = rig.transport.last_value(WidId::SSID_PROBE_REQ).unwrap();
    assert_eq!(ssids.len(), 15);
    assert_eq!(&ssids[..2], &[2, 4]);
    assert_eq!(&ssids[2..6], b"home");
    assert_eq!(ssids[6], 8);
    assert_eq!(rig.transport.last_value(WidId::SCAN_CHANNEL_LIST), Some(vec![0, 5, 10]));
    assert_eq!(rig.transport.last_value(WidId::START_SCAN_REQ), Some(vec![ScanSource::User as u8]));

    assert_eq!(vif.state(), Some(HifState::Scanning));
    assert_eq!(vif.timers_pending().await, (true, false, false));
}

#[tokio::test]
async fn radio_is_exclusive_across_interfaces() {
    let rig = rig(2).await;
    let (a, b) = (&rig.vifs[0], &rig.vifs[1]);
    let (_log, cb) = scan_log();
    a.scan(ScanRequest::default(), cb).await.unwrap();
    rig.transport.clear();

    let (_other, cb) = scan_log();
    assert!(matches!(b.scan(ScanRequest::default(), cb).await, Err(Error::Busy(_))));
    let (_conn, cb) = conn_log();
    assert!(matches!(b.set_join_req(connect_params(), cb).await, Err(Error::Busy(_))));
    assert!(matches!(
        b.remain_on_channel(1, 100, 6, Box::new(|_: u64| {})).await,
        Err(Error::Busy(_))
    ));

    assert!(rig.transport.exchanges().is_empty());
    assert_eq!(b.state(), Some(HifState::Idle));
    assert_eq!(b.timers_pending().await, (false, false, false));
}

#[tokio::test]
async fn scan_is_refused_while_another_interface_joins() {
    let rig = rig(2).await;
    let (a, b) = (&rig.vifs[0], &rig.vifs[1]);
    let (_conn, cb) = conn_log();
    a.set_join_req(connect_params(), cb).await.unwrap();
    assert_eq!(a.state(), Some(HifState::WaitingConnResp));
    rig.transport.clear();

    let (log, cb) = scan_log();
    assert!(matches!(b.scan(ScanRequest::default(), cb).await, Err(Error::Busy(_))));
    assert!(rig.transport.exchanges().is_empty());
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(b.state(), Some(HifState::Idle));
    assert_eq!(b.timers_pending().await, (false, false, false));
}

#[tokio::test]
async fn scan_is_refused_during_external_auth_elsewhere() {
    let rig = rig(2).await;
    let (a, b) = (&rig.vifs[0], &rig.vifs[1]);
    let params = ConnectParams {
        auth_type: AuthType::Sae,
        external_auth: Some(ExternalAuthRequest {
            bssid: BSSID,
            ssid: b"lab".to_vec(),
            key_mgmt_suite: 0x000F_AC08,
        }),
        ..connect_params()
    };
    let (_conn, cb) = conn_log();
    a.set_join_req(params, cb).await.unwrap();
    assert_eq!(a.state(), Some(HifState::ExternalAuth));
    rig.transport.clear();

    let (log, cb) = scan_log();
    assert!(matches!(b.scan(ScanRequest::default(), cb).await, Err(Error::Busy(_))));
    assert!(rig.transport.exchanges().is_empty());
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(b.state(), Some(HifState::Idle));
    assert_eq!(b.timers_pending().await, (false, false, false));
}

#[tokio::test(start_paused = true)]
async fn scan_timeout_aborts_exactly_once() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let (log, cb) = scan_log();
    vif.scan(ScanRequest::default(), cb).await.unwrap();

    sleep(rig.wilc.config().scan_timeout + Duration::from_millis(10)).await;
    rig.wilc.flush().await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec![ScanEvent::Aborted]);
    assert_eq!(rig.transport.last_value(WidId::ABORT_RUNNING_SCAN), Some(vec![1]));
    assert_eq!(vif.state(), Some(HifState::Idle));

    // The firmware finishing late changes nothing.
    rig.wilc.scan_complete_received(&mock::scan_complete_frame(vif.wire_idx()));
    rig.wilc.flush().await.unwrap();
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn passive_scan_timeout_follows_dwell_time() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let (log, cb) = scan_log();
    let req = ScanRequest {
        scan_type: ScanType::Passive,
        channels: vec![1, 6, 11],
        duration: 100,
        ..Default::default()
    };
    vif.scan(req, cb).await.unwrap();
    assert_eq!(rig.transport.last_value(WidId::PASSIVE_SCAN_TIME), Some(vec![100, 0]));
    assert_eq!(rig.transport.last_value(WidId::SCAN_TYPE), Some(vec![0]));

    sleep(Duration::from_millis(700)).await;
    rig.wilc.flush().await.unwrap();
    assert_eq!(vif.state(), Some(HifState::Scanning));

    sleep(Duration::from_millis(200)).await;
    rig.wilc.flush().await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec![ScanEvent::Aborted]);
    assert_eq!(vif.state(), Some(HifState::Idle));
}

#[tokio::test]
async fn failed_scan_dispatch_leaves_no_trace() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    rig.transport.fail_on(WidId::START_SCAN_REQ);
    let (log, cb) = scan_log();
    assert!(matches!(vif.scan(ScanRequest::default(), cb).await, Err(Error::Transport(_))));
    assert_eq!(vif.state(), Some(HifState::Idle));
    assert!(!vif.mirror().scan_pending());
    assert_eq!(vif.timers_pending().await, (false, false, false));
    assert!(log.lock().unwrap().is_empty());

    rig.transport.clear_failures();
    let (_log, cb) = scan_log();
    vif.scan(ScanRequest::default(), cb).await.unwrap();
}

#[tokio::test]
async fn join_then_connected() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    rig.transport
        .set_response(WidId::ASSOC_RES_INFO, mock::assoc_resp_info(0, &[0xDD, 0x01, 0x07]));
    let (log, cb) = conn_log();
    vif.set_join_req(connect_params(), cb).await.unwrap();

    assert_eq!(
        rig.transport.sent_ids(),
        vec![
            WidId::SET_MFP,
            WidId::INFO_ELEMENT_ASSOCIATE,
            WidId::MODE_11I,
            WidId::AUTH_TYPE,
            WidId::JOIN_REQ_EXTENDED,
        ]
    );
    assert_eq!(rig.transport.last_value(WidId::AUTH_TYPE), Some(vec![AuthType::OpenSystem as u8]));
    assert_eq!(vif.state(), Some(HifState::WaitingConnResp));
    assert!(vif.is_connecting());
    assert_eq!(vif.timers_pending().await, (false, true, false));

    rig.wilc
        .gnrl_async_info_received(&mock::async_info_frame(vif.wire_idx(), 1))
        .await;
    rig.wilc.flush().await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![(ConnEvent::ConnResp, MacStatus::Connected, 0, vec![0xDD, 0x01, 0x07])]
    );
    assert_eq!(vif.state(), Some(HifState::Connected));
    assert_eq!(vif.assoc_bssid().await, Some(BSSID));
    assert!(!vif.is_connecting());
    assert_eq!(vif.timers_pending().await, (false, false, false));
}

#[tokio::test]
async fn refused_association_goes_idle() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    rig.transport
        .set_response(WidId::ASSOC_RES_INFO, mock::assoc_resp_info(17, &[]));
    let (log, cb) = conn_log();
    vif.set_join_req(connect_params(), cb).await.unwrap();
    rig.wilc
        .gnrl_async_info_received(&mock::async_info_frame(vif.wire_idx(), 1))
        .await;
    rig.wilc.flush().await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![(ConnEvent::ConnResp, MacStatus::Connected, 17, vec![])]
    );
    assert_eq!(vif.state(), Some(HifState::Idle));
    assert_eq!(vif.assoc_bssid().await, None);
}

#[tokio::test]
async fn missing_association_response_is_a_failure() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    rig.transport
        .set_response(WidId::ASSOC_RES_INFO, mock::assoc_resp_info(0, &[]));
    rig.transport.withhold(WidId::ASSOC_RES_INFO);
    let (log, cb) = conn_log();
    vif.set_join_req(connect_params(), cb).await.unwrap();
    rig.wilc
        .gnrl_async_info_received(&mock::async_info_frame(vif.wire_idx(), 1))
        .await;
    rig.wilc.flush().await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![(
            ConnEvent::ConnResp,
            MacStatus::Connected,
            WLAN_STATUS_UNSPECIFIED_FAILURE,
            vec![]
        )]
    );
    assert_eq!(vif.state(), Some(HifState::Idle));
    assert_eq!(vif.assoc_bssid().await, None);
}

#[tokio::test]
async fn firmware_disconnect_during_join_skips_assoc_query() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let (log, cb) = conn_log();
    vif.set_join_req(connect_params(), cb).await.unwrap();
    rig.wilc
        .gnrl_async_info_received(&mock::async_info_frame(vif.wire_idx(), 0))
        .await;
    rig.wilc.flush().await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![(ConnEvent::ConnResp, MacStatus::Disconnected, WLAN_STATUS_UNSPECIFIED_FAILURE, vec![])]
    );
    assert!(rig.transport.exchanges().iter().all(|x| x.op == crate::wid::frame::CfgOp::Set));
    assert_eq!(vif.state(), Some(HifState::Idle));
}

#[tokio::test]
async fn failed_join_dispatch_reverts() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    rig.transport.fail_on(WidId::JOIN_REQ_EXTENDED);
    let (log, cb) = conn_log();
    assert!(vif.set_join_req(connect_params(), cb).await.is_err());
    assert!(!vif.is_connecting());
    assert!(!vif.mirror().has_conn_result());
    assert_eq!(vif.state(), Some(HifState::Idle));
    assert_eq!(vif.timers_pending().await, (false, false, false));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_reports_failure_once() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let (log, cb) = conn_log();
    vif.set_join_req(connect_params(), cb).await.unwrap();

    sleep(rig.wilc.config().connect_timeout + Duration::from_millis(10)).await;
    rig.wilc.flush().await.unwrap();

    // A connect indication racing the timeout lands after it and is ignored.
    rig.transport
        .set_response(WidId::ASSOC_RES_INFO, mock::assoc_resp_info(0, &[]));
    rig.wilc
        .gnrl_async_info_received(&mock::async_info_frame(vif.wire_idx(), 1))
        .await;
    rig.wilc.flush().await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![(ConnEvent::ConnResp, MacStatus::Disconnected, WLAN_STATUS_UNSPECIFIED_FAILURE, vec![])]
    );
    assert_eq!(rig.transport.count(WidId::DISCONNECT), 1);
    assert_eq!(vif.state(), Some(HifState::Idle));
    assert!(!vif.is_connecting());
}

#[tokio::test]
async fn sae_join_asks_the_stack_first() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let req = ExternalAuthRequest {
        bssid: BSSID,
        ssid: b"lab".to_vec(),
        key_mgmt_suite: 0x000F_AC08,
    };
    let params = ConnectParams {
        auth_type: AuthType::Sae,
        external_auth: Some(req.clone()),
        ..connect_params()
    };
    let (log, cb) = conn_log();
    vif.set_join_req(params, cb).await.unwrap();
    assert_eq!(vif.state(), Some(HifState::ExternalAuth));

    rig.wilc
        .gnrl_async_info_received(&mock::async_info_frame(vif.wire_idx(), 0))
        .await;
    rig.wilc.flush().await.unwrap();
    assert_eq!(rig.notifier.auth_requests(), vec![(vif.wire_idx(), req)]);
    assert_eq!(vif.state(), Some(HifState::WaitingConnResp));
    assert!(log.lock().unwrap().is_empty());

    rig.transport
        .set_response(WidId::ASSOC_RES_INFO, mock::assoc_resp_info(0, &[]));
    rig.wilc
        .gnrl_async_info_received(&mock::async_info_frame(vif.wire_idx(), 1))
        .await;
    rig.wilc.flush().await.unwrap();
    assert_eq!(vif.state(), Some(HifState::Connected));
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn disconnect_when_connected_notifies_stack() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let log = connect(&rig, vif).await;

    vif.disconnect().await.unwrap();
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!((log[1].0, log[1].1), (ConnEvent::DisconnNotif, MacStatus::Disconnected));
    assert_eq!(rig.transport.last_value(WidId::DISCONNECT), Some(vec![0]));
    assert_eq!(vif.state(), Some(HifState::Idle));
    assert!(!vif.mirror().has_conn_result());
}

#[tokio::test]
async fn firmware_reported_disconnect_clears_association() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let log = connect(&rig, vif).await;

    rig.wilc
        .gnrl_async_info_received(&mock::async_info_frame(vif.wire_idx(), 0))
        .await;
    rig.wilc.flush().await.unwrap();

    assert_eq!(log.lock().unwrap()[1].0, ConnEvent::DisconnNotif);
    assert_eq!(vif.state(), Some(HifState::Idle));
    assert_eq!(vif.assoc_bssid().await, None);
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_waiting_reports_once() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let (log, cb) = conn_log();
    vif.set_join_req(connect_params(), cb).await.unwrap();

    vif.disconnect().await.unwrap();
    assert_eq!(vif.timers_pending().await, (false, false, false));

    sleep(rig.wilc.config().connect_timeout * 2).await;
    rig.wilc.flush().await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!((log[0].0, log[0].1), (ConnEvent::ConnResp, MacStatus::Disconnected));
    assert_eq!(rig.transport.count(WidId::DISCONNECT), 1);
}

#[tokio::test]
async fn disconnect_aborts_a_running_scan() {
    let rig = rig(2).await;
    let (scanner, other) = (&rig.vifs[0], &rig.vifs[1]);
    let (log, cb) = scan_log();
    scanner.scan(ScanRequest::default(), cb).await.unwrap();

    other.disconnect().await.unwrap();
    rig.wilc.scan_complete_received(&mock::scan_complete_frame(scanner.wire_idx()));
    rig.wilc.flush().await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec![ScanEvent::Aborted]);
    assert_eq!(rig.transport.count(WidId::ABORT_RUNNING_SCAN), 1);
    assert_eq!(scanner.state(), Some(HifState::Idle));
    assert_eq!(scanner.timers_pending().await, (false, false, false));
}

#[tokio::test]
async fn deinit_aborts_scan_and_drops_driver() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let (log, cb) = scan_log();
    vif.scan(ScanRequest::default(), cb).await.unwrap();

    vif.deinit().await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec![ScanEvent::Aborted]);
    assert_eq!(vif.state(), None);
    assert!(matches!(vif.deinit().await, Err(Error::NoDriver(0))));

    let (_log, cb) = scan_log();
    assert!(matches!(vif.scan(ScanRequest::default(), cb).await, Err(Error::NoDriver(0))));
}

fn roc_log() -> (Log<u64>, RocExpiredFn) {
    let log: Log<u64> = Arc::default();
    let sink = log.clone();
    (log, Box::new(move |cookie: u64| sink.lock().unwrap().push(cookie)))
}

#[tokio::test(start_paused = true)]
async fn listen_expires_by_timer_once() {
    let rig = rig(2).await;
    let (vif, other) = (&rig.vifs[0], &rig.vifs[1]);
    let (log, cb) = roc_log();
    vif.remain_on_channel(7, 500, 6, cb).await.unwrap();
    assert_eq!(rig.transport.last_value(WidId::REMAIN_ON_CHAN), Some(vec![1, 6]));
    assert_eq!(vif.state(), Some(HifState::P2pListen));

    let (_scan, scan_cb) = scan_log();
    assert!(matches!(other.scan(ScanRequest::default(), scan_cb).await, Err(Error::Busy(_))));

    sleep(Duration::from_millis(600)).await;
    rig.wilc.flush().await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec![7]);
    assert_eq!(rig.transport.last_value(WidId::REMAIN_ON_CHAN), Some(vec![0, 100]));
    assert_eq!(vif.state(), Some(HifState::Idle));

    vif.listen_state_expired(7).await.unwrap();
    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(rig.transport.count(WidId::REMAIN_ON_CHAN), 2);
}

#[tokio::test(start_paused = true)]
async fn deinit_drops_listen_and_connect_callbacks_uncalled() {
    let rig = rig(2).await;
    let (p2p, sta) = (&rig.vifs[0], &rig.vifs[1]);
    let (roc, cb) = roc_log();
    p2p.remain_on_channel(3, 500, 6, cb).await.unwrap();
    p2p.deinit().await.unwrap();

    let (conn, cb) = conn_log();
    sta.set_join_req(connect_params(), cb).await.unwrap();
    sta.deinit().await.unwrap();

    sleep(Duration::from_secs(30)).await;
    rig.wilc.flush().await.unwrap();
    assert!(roc.lock().unwrap().is_empty());
    assert!(conn.lock().unwrap().is_empty());
    assert_eq!(p2p.state(), None);
    assert_eq!(sta.state(), None);
}

#[tokio::test(start_paused = true)]
async fn listen_ended_early_does_not_fire_again() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let (log, cb) = roc_log();
    vif.remain_on_channel(3, 500, 1, cb).await.unwrap();

    vif.listen_state_expired(3).await.unwrap();
    assert_eq!(vif.timers_pending().await, (false, false, false));
    sleep(Duration::from_secs(1)).await;
    rig.wilc.flush().await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec![3]);
    assert_eq!(vif.state(), Some(HifState::Idle));
}

#[tokio::test]
async fn stale_listen_expiry_is_ignored() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let (log, cb) = roc_log();
    vif.remain_on_channel(2, 60_000, 11, cb).await.unwrap();

    vif.submit(TaskBody::ListenExpired { cookie: 1 }).unwrap();
    rig.wilc.flush().await.unwrap();
    assert_eq!(vif.state(), Some(HifState::P2pListen));
    assert!(log.lock().unwrap().is_empty());

    vif.submit(TaskBody::ListenExpired { cookie: 2 }).unwrap();
    rig.wilc.flush().await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn tx_power_read_runs_after_queued_work() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    rig.transport.set_response(WidId::TX_POWER, vec![18]);

    vif.set_power_mgmt(true).unwrap();
    assert_eq!(vif.get_tx_power().await.unwrap(), 18);
    assert_eq!(rig.transport.last_value(WidId::POWER_MANAGEMENT), Some(vec![1]));
}

#[tokio::test]
async fn worker_runs_tasks_one_at_a_time_in_order() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    rig.transport.set_latency(Duration::from_millis(5));

    vif.setup_multicast_filter(true, vec![[0x01, 0x00, 0x5E, 0, 0, 1]]).unwrap();
    vif.set_power_mgmt(false).unwrap();
    vif.set_wowlan_trigger(true).unwrap();
    vif.add_station(Default::default()).unwrap();
    rig.wilc.flush().await.unwrap();

    assert_eq!(
        rig.transport.sent_ids(),
        vec![
            WidId::SETUP_MULTICAST_FILTER,
            WidId::POWER_MANAGEMENT,
            WidId::WOWLAN_TRIGGER,
            WidId::ADD_STA,
        ]
    );
    assert_eq!(rig.transport.max_in_flight(), 1);
    assert_eq!(rig.transport.last_value(WidId::SETUP_MULTICAST_FILTER).map(|v| v.len()), Some(14));
}

#[tokio::test(start_paused = true)]
async fn periodic_stats_only_while_connected() {
    let config = HifConfig {
        stats_period: Duration::from_secs(1),
        ..HifConfig::default()
    };
    let rig = rig_with(config, 1).await;
    let vif = &rig.vifs[0];
    rig.transport.set_response(WidId::LINKSPEED, vec![65]);
    rig.transport.set_response(WidId::RSSI, vec![0xC4]);
    rig.transport.set_response(WidId::SUCCESS_FRAME_COUNT, 1200u32.to_le_bytes().to_vec());

    sleep(Duration::from_millis(1500)).await;
    rig.wilc.flush().await.unwrap();
    assert!(rig.transport.exchanges().is_empty());

    connect(&rig, vif).await;
    sleep(Duration::from_millis(1100)).await;
    rig.wilc.flush().await.unwrap();

    let stats = vif.periodic_stats();
    assert_eq!((stats.link_speed, stats.rssi, stats.tx_cnt), (65, -60, 1200));
    assert_eq!(rig.notifier.tcp_ack_toggles().first(), Some(&(vif.wire_idx(), true)));
}

#[tokio::test]
async fn default_link_speed_leaves_tcp_filter_alone() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    rig.transport.set_response(WidId::LINKSPEED, vec![72]);
    assert_eq!(vif.get_statistics().await.unwrap().link_speed, 72);
    assert!(rig.notifier.tcp_ack_toggles().is_empty());

    rig.transport.set_response(WidId::LINKSPEED, vec![11]);
    vif.get_statistics().await.unwrap();
    assert_eq!(rig.notifier.tcp_ack_toggles(), vec![(vif.wire_idx(), false)]);
}

#[tokio::test]
async fn antenna_needs_valid_gpios() {
    let rig = rig(1).await;
    assert!(matches!(rig.vifs[0].set_antenna(1).await, Err(Error::InvalidArgument(_))));

    let dual = |gpio1, gpio2| HifConfig {
        antenna: AntennaConfig { mode: AntennaSwitchMode::Dual, gpio1, gpio2 },
        ..quiet_config()
    };
    let rig = rig_with(dual(4, 4), 1).await;
    assert!(matches!(rig.vifs[0].set_antenna(1).await, Err(Error::InvalidArgument(_))));
    let rig = rig_with(dual(4, 3), 1).await;
    assert!(matches!(rig.vifs[0].set_antenna(1).await, Err(Error::InvalidArgument(_))));
    assert!(rig.transport.exchanges().is_empty());

    let rig = rig_with(dual(0, 4), 1).await;
    rig.vifs[0].set_antenna(1).await.unwrap();
    assert_eq!(
        rig.transport.last_value(WidId::ANTENNA_SELECTION),
        Some(encode_antenna(1, 0, 4, AntennaSwitchMode::Dual.wire_value()))
    );
}

#[tokio::test]
async fn del_allstation_without_stations_sends_nothing() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    vif.del_allstation(&[[0; 6], [0; 6]]).await.unwrap();
    assert!(rig.transport.exchanges().is_empty());

    vif.del_allstation(&[[0; 6], [1; 6]]).await.unwrap();
    let mut expected = vec![1u8];
    expected.extend_from_slice(&[1; 6]);
    assert_eq!(rig.transport.last_value(WidId::DEL_ALL_STA), Some(expected));

    vif.del_station(None).await.unwrap();
    assert_eq!(rig.transport.last_value(WidId::REMOVE_STA), Some(vec![0xFF; 6]));
}

#[tokio::test]
async fn group_key_binds_to_associated_bss() {
    let rig = rig(1).await;
    let vif = &rig.vifs[0];
    let key = [0x5A; 16];
    let km = KeyMaterial::new(&key);

    vif.add_rx_gtk(&km, 1, None, OpMode::Station, 0).await.unwrap();
    assert_eq!(rig.transport.last_value(WidId::ADD_RX_GTK), Some(encode_gtk(&[0; 6], None, 1, &km).unwrap()));

    connect(&rig, vif).await;
    vif.add_rx_gtk(&km, 1, None, OpMode::Station, 0).await.unwrap();
    assert_eq!(rig.transport.last_value(WidId::ADD_RX_GTK), Some(encode_gtk(&BSSID, None, 1, &km).unwrap()));

    rig.transport.clear();
    vif.add_rx_gtk(&km, 2, None, OpMode::Ap, 4).await.unwrap();
    assert_eq!(rig.transport.sent_ids(), vec![WidId::MODE_11I, WidId::ADD_RX_GTK]);
}

#[tokio::test]
async fn cfg_sends_only_set_fields() {
    let rig = rig(1).await;
    let params = CfgParams { rts_threshold: Some(2347), ..Default::default() };
    rig.vifs[0].hif_set_cfg(&params).await.unwrap();
    assert_eq!(rig.transport.sent_wids(), vec![(WidId::RTS_THRESHOLD, 2347u16.to_le_bytes().to_vec())]);

    rig.vifs[0].hif_set_cfg(&CfgParams::default()).await.unwrap();
    assert_eq!(rig.transport.exchanges().len(), 1);
}

fn eap(frame: Vec<u8>, delivered: &Log<(usize, u32)>, released: &Arc<StdMutex<usize>>) -> BufferedEap {
    let d = delivered.clone();
    let r = released.clone();
    BufferedEap::new(
        frame,
        2,
        move |f: &[u8], off: u32| d.lock().unwrap().push((f.len(), off)),
        move || *r.lock().unwrap() += 1,
    )
}

#[tokio::test]
async fn buffered_eap_is_always_released() {
    let rig = rig(1).await;
    let vif = rig.vifs[0].clone();
    let delivered: Log<(usize, u32)> = Arc::default();
    let released = Arc::new(StdMutex::new(0));

    vif.send_buffered_eap(eap(vec![0x88; 40], &delivered, &released)).unwrap();
    vif.send_buffered_eap(eap(Vec::new(), &delivered, &released)).unwrap();
    rig.wilc.flush().await.unwrap();
    assert_eq!(*delivered.lock().unwrap(), vec![(40, 2)]);
    assert_eq!(*released.lock().unwrap(), 2);

    rig.wilc.shutdown().await.unwrap();
    assert!(vif.send_buffered_eap(eap(vec![0x88; 8], &delivered, &released)).is_err());
    assert_eq!(delivered.lock().unwrap().len(), 1);
    assert_eq!(*released.lock().unwrap(), 3);
}

#[tokio::test]
async fn interface_slots_are_reused() {
    let rig = rig(2).await;
    assert!(matches!(rig.wilc.add_interface("wlan2").await, Err(Error::InvalidArgument(_))));
    assert!(rig.wilc.vif_from_wire_idx(0).is_none());
    assert_eq!(rig.wilc.vif_from_wire_idx(2).map(|v| v.idx()), Some(1));

    rig.wilc.remove_interface(0).await.unwrap();
    assert!(rig.wilc.vif_from_wire_idx(1).is_none());
    let again = rig.wilc.add_interface("p2p0").await.unwrap();
    assert_eq!((again.idx(), again.name()), (0, "p2p0"));
}

#[tokio::test]
async fn shutdown_rejects_new_work() {
    let rig = rig(2).await;
    let vif = rig.vifs[0].clone();
    rig.wilc.shutdown().await.unwrap();

    assert!(rig.wilc.interfaces().is_empty());
    assert_eq!(vif.state(), None);
    assert!(matches!(vif.set_power_mgmt(true), Err(Error::QueueClosed)));
    assert!(matches!(rig.wilc.flush().await, Err(Error::QueueClosed)));
}
