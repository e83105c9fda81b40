use serde::Deserialize;

/// Daemon configuration, read from `config/global.toml`. Every field is
/// optional; accessors fall back to defaults so a missing or partial file
/// still yields a working daemon.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct GlobalConfig {
    pub listen_addr: Option<String>,
    pub working_dir: Option<String>,
    pub bots_file: Option<String>,
    pub reconcile_interval_secs: Option<u64>,
}

impl GlobalConfig {
    pub fn load() -> anyhow::Result<Self> {
        let s = std::fs::read_to_string("config/global.toml").unwrap_or_default();
        let cfg: Self = toml::from_str(&s).unwrap_or_default();
        Ok(cfg)
    }

    pub fn listen_addr(&self) -> String {
        self.listen_addr
            .clone()
            .unwrap_or_else(|| "127.0.0.1:57575".to_string())
    }

    pub fn working_dir(&self) -> String {
        self.working_dir
            .clone()
            .unwrap_or_else(|| "./botfiles".to_string())
    }

    pub fn bots_file(&self) -> String {
        self.bots_file
            .clone()
            .unwrap_or_else(|| "./bots.json".to_string())
    }

    pub fn reconcile_interval_secs(&self) -> u64 {
        self.reconcile_interval_secs.unwrap_or(10)
    }
}
