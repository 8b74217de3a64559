//! The idle monitor: polls the player count on a fixed interval, and once
//! the server has been empty past the configured threshold, stops it over
//! RCON, waits for the process to exit, and releases the instance.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::rcon::{RconClient, RconError};
use crate::system::{InstanceHandle, ProcessProbe};

/// How often to check whether the server process has exited after the stop
/// command was accepted. Independent of the player-count interval.
const EXIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Tracks how long the server has been continuously empty. A poll that sees
/// players resets the clock unconditionally; failed polls don't touch it.
pub struct IdleTracker {
    threshold: Duration,
    last_active: Instant,
}

impl IdleTracker {
    pub fn new(threshold: Duration, now: Instant) -> Self {
        Self {
            threshold,
            last_active: now,
        }
    }

    /// Records a successful poll and reports whether the idle threshold has
    /// been strictly exceeded.
    pub fn observe(&mut self, players_online: u32, now: Instant) -> bool {
        if players_online > 0 {
            self.last_active = now;
            return false;
        }
        now.duration_since(self.last_active) > self.threshold
    }
}

pub struct IdleMonitor<P, H> {
    config: Config,
    probe: P,
    instance: H,
}

impl<P: ProcessProbe, H: InstanceHandle> IdleMonitor<P, H> {
    pub fn new(config: Config, probe: P, instance: H) -> Self {
        Self {
            config,
            probe,
            instance,
        }
    }

    /// Runs the monitor to completion: Polling, then Stopping once the idle
    /// threshold is crossed, then WaitingForExit and Releasing. Only an
    /// authentication failure (or an exhausted stop-attempt budget) is
    /// fatal before the stop command has been accepted.
    pub async fn run(self) -> Result<()> {
        self.poll_until_stopped().await?;
        self.wait_for_process_exit().await;
        self.release_instance().await
    }

    async fn poll_until_stopped(&self) -> Result<()> {
        let interval = self.config.check_interval();
        let mut tracker = IdleTracker::new(self.config.idle_threshold(), Instant::now());
        let mut failed_stop_attempts = 0u32;

        loop {
            sleep(interval).await;

            let status = match self
                .config
                .ping_protocol
                .query(&self.config.host, self.config.port, self.config.ping_timeout())
                .await
            {
                Ok(status) => status,
                Err(e) => {
                    // Status unknown: the server may be booting, restarting
                    // or briefly unreachable. Wait for the next cycle.
                    warn!("status poll failed: {e}");
                    continue;
                }
            };

            debug!(
                online = status.players_online,
                max = status.players_max,
                version = %status.version,
                "poll complete"
            );

            if !tracker.observe(status.players_online, Instant::now()) {
                continue;
            }

            info!(
                threshold_secs = self.config.idle_threshold_secs,
                "server idle past threshold, issuing stop"
            );
            match self.issue_stop().await {
                Ok(()) => return Ok(()),
                Err(e) => self.register_stop_failure(e, &mut failed_stop_attempts)?,
            }
        }
    }

    /// Classifies a failed stop attempt: an authentication rejection is
    /// fatal (retrying with the same secret cannot succeed), anything else
    /// sends the monitor back to polling until the attempt budget, if one
    /// is configured, runs out.
    fn register_stop_failure(&self, error: RconError, failed_attempts: &mut u32) -> Result<()> {
        if matches!(error, RconError::AuthenticationFailed) {
            return Err(anyhow!(error));
        }
        *failed_attempts += 1;
        warn!(attempt = *failed_attempts, "stop attempt failed: {error}");
        if self.config.max_stop_attempts > 0 && *failed_attempts >= self.config.max_stop_attempts {
            return Err(anyhow!(
                "giving up after {failed_attempts} failed stop attempts"
            ));
        }
        Ok(())
    }

    /// Connect + authenticate + `stop` as one exchange. Any failure leaves
    /// the server untouched and the monitor back in its polling loop.
    async fn issue_stop(&self) -> std::result::Result<(), RconError> {
        let mut rcon = RconClient::connect(
            &self.config.host,
            self.config.rcon_port,
            self.config.ping_timeout(),
        )
        .await?;
        rcon.authenticate(&self.config.rcon_secret).await?;
        let reply = rcon.send_command("stop").await?;
        info!(reply = %reply, "stop command accepted");
        Ok(())
    }

    async fn wait_for_process_exit(&self) {
        while self.probe.is_alive(self.config.server_pid) {
            debug!(pid = self.config.server_pid, "server process still running");
            sleep(EXIT_POLL_INTERVAL).await;
        }
        info!(pid = self.config.server_pid, "server process has exited");
    }

    /// Releasing the instance must not be skipped: a stopped server on a
    /// running instance is the cost this monitor exists to prevent, so a
    /// failed release escalates to a local halt.
    async fn release_instance(&self) -> Result<()> {
        match self.instance.release().await {
            Ok(()) => {
                info!("instance release requested");
                Ok(())
            }
            Err(e) => {
                error!("instance release failed: {e}");
                self.instance.halt().await
            }
        }
    }

    /// Shutdown tail shared by tests: exit wait followed by release.
    #[cfg(test)]
    async fn finish(&self) -> Result<()> {
        self.wait_for_process_exit().await;
        self.release_instance().await
    }
}
