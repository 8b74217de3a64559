use std::time::Duration;

use clap::Parser;

use crate::protocol::PingVariant;

/// Runtime configuration. Every flag mirrors the environment variable the
/// host image exports, so the monitor runs unattended under systemd with no
/// arguments at all.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[arg(long, env = "SERVER_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long, env = "SERVER_PORT", default_value_t = 25565, help = "Game port to poll for player count")]
    pub port: u16,

    #[arg(long, env = "RCON_PORT", default_value_t = 25575)]
    pub rcon_port: u16,

    #[arg(long, env = "RCON_SECRET", hide_env_values = true)]
    pub rcon_secret: String,

    #[arg(long, env = "PLAYER_CHECK_INTERVAL", default_value_t = 180, help = "Seconds between player-count polls")]
    pub check_interval_secs: u64,

    #[arg(long, env = "IDLE_THRESHOLD", default_value_t = 600, help = "Continuous empty seconds before the server is stopped")]
    pub idle_threshold_secs: u64,

    #[arg(long, env = "PING_TIMEOUT", default_value_t = 10, help = "Read window for a single query, in seconds")]
    pub ping_timeout_secs: u64,

    #[arg(long, env = "SERVER_PID", default_value_t = -1, help = "Pid of the monitored server process")]
    pub server_pid: i32,

    #[arg(long, env = "INSTANCE_ID")]
    pub instance_id: String,

    #[arg(long, env = "PING_PROTOCOL", value_enum, default_value_t = PingVariant::Modern)]
    pub ping_protocol: PingVariant,

    #[arg(long, env = "STOP_ATTEMPTS", default_value_t = 0, help = "Failed stop attempts before giving up (0 = retry forever)")]
    pub max_stop_attempts: u32,
}

impl Config {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}
