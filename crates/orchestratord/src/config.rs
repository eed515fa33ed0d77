//! Process configuration: sane defaults, overridable by environment
//! variables. No config file parsing — this deployment is container-native.

use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub bind_addr: SocketAddr,
    pub fresh_after_secs: u64,
    pub stale_after_secs: u64,
    pub job_max_attempts: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            fresh_after_secs: 30,
            stale_after_secs: 90,
            job_max_attempts: 3,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("ORCHESTRATORD_PORT").or_else(|_| std::env::var("PORT")) {
            if let Ok(port) = port.parse::<u16>() {
                config.bind_addr.set_port(port);
            }
        }
        if let Ok(v) = std::env::var("ORCHESTRATORD_FRESH_AFTER_SECS") {
            if let Ok(v) = v.parse() {
                config.fresh_after_secs = v;
            }
        }
        if let Ok(v) = std::env::var("ORCHESTRATORD_STALE_AFTER_SECS") {
            if let Ok(v) = v.parse() {
                config.stale_after_secs = v;
            }
        }
        if let Ok(v) = std::env::var("ORCHESTRATORD_JOB_MAX_ATTEMPTS") {
            if let Ok(v) = v.parse() {
                config.job_max_attempts = v;
            }
        }

        config
    }
}
