use super::task::TaskBody;
use super::{HifState, HostIfDrv, RemainOnChannel, RocExpiredFn, Vif};
use crate::wid::records::{FALSE_FRMWR_CHANNEL, encode_remain_on_channel};
use crate::wid::{Wid, WidId};
use crate::{Error, Result};
use std::time::Duration;

impl Vif {
    /// Parks the radio on `chan` for `duration_ms`. `expired` runs at most once when it
    /// leaves, and never if the interface is deinitialised first.
    pub async fn remain_on_channel(
        &self,
        cookie: u64,
        duration_ms: u32,
        chan: u8,
        expired: RocExpiredFn,
    ) -> Result<()> {
        let device = self.device()?;
        let _radio = device.radio.lock().await;
        device.check_radio_free()?;
        if self.is_connecting() {
            tracing::debug!(vif = self.idx, "remain-on-channel refused while connecting");
            return Err(Error::Busy("connect in progress".into()));
        }

        let mut slot = self.drv.lock().await;
        let drv = slot.as_mut().ok_or(Error::NoDriver(self.idx))?;

        let value = encode_remain_on_channel(true, chan);
        self.set_wids(&mut [Wid::string(WidId::REMAIN_ON_CHAN, value)])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to set remain on channel: {}", e))?;

        drv.roc = RemainOnChannel {
            expired: Some(expired),
            ch: chan,
            cookie,
        };
        drv.set_state(HifState::P2pListen);
        tracing::debug!(vif = self.idx, chan, cookie, duration_ms, "listening");
        drv.listen_timer.arm(
            Duration::from_millis(u64::from(duration_ms)),
            self.timer_submit(move || TaskBody::ListenExpired { cookie }),
        );
        Ok(())
    }

    /// Ends a listen period early.
    pub async fn listen_state_expired(&self, cookie: u64) -> Result<()> {
        let mut slot = self.drv.lock().await;
        let drv = slot.as_mut().ok_or(Error::NoDriver(self.idx))?;
        drv.listen_timer.cancel();
        self.roc_expired(drv, cookie).await
    }

    pub(super) async fn handle_listen_expired(&self, cookie: u64) -> Result<()> {
        let mut slot = self.drv.lock().await;
        let Some(drv) = slot.as_mut() else {
            return Ok(());
        };
        if drv.roc.cookie != cookie {
            tracing::debug!(vif = self.idx, cookie, current = drv.roc.cookie, "stale listen expiry ignored");
            return Ok(());
        }
        self.roc_expired(drv, cookie).await
    }

    pub(super) async fn roc_expired(&self, drv: &mut HostIfDrv, cookie: u64) -> Result<()> {
        if drv.state() != HifState::P2pListen {
            tracing::debug!(vif = self.idx, state = ?drv.state(), "not in listen state");
            return Ok(());
        }
        let value = encode_remain_on_channel(false, FALSE_FRMWR_CHANNEL);
        let res = self
            .set_wids(&mut [Wid::string(WidId::REMAIN_ON_CHAN, value)])
            .await;
        if let Err(e) = &res {
            tracing::error!(vif = self.idx, "failed to clear remain on channel: {}", e);
        }
        if let Some(expired) = drv.roc.expired.take() {
            expired(cookie);
        }
        drv.restore_state();
        res
    }
}
