use lazy_static::lazy_static;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::RwLock;

lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::new());
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Packets inspected per segment before signature extraction gives up.
    pub scan_packet_budget: usize,
    /// Buffer size used by the merge worker's copy loop.
    pub copy_buffer_size: usize,
    /// Consecutive in-sync packets required to accept an alignment offset.
    pub min_sync_run: usize,
}

impl Config {
    fn new() -> Self {
        let mut config = Config {
            scan_packet_budget: 1500,
            copy_buffer_size: 256 * 1024,
            min_sync_run: 4,
        };

        // Try loading from environment variables first
        if let Ok(v) = env::var("TSMERGE_SCAN_BUDGET") {
            if let Ok(n) = v.parse() {
                config.scan_packet_budget = n;
            }
        }
        if let Ok(v) = env::var("TSMERGE_COPY_BUFFER") {
            if let Ok(n) = v.parse() {
                config.copy_buffer_size = n;
            }
        }
        if let Ok(v) = env::var("TSMERGE_MIN_SYNC_RUN") {
            if let Ok(n) = v.parse() {
                config.min_sync_run = n;
            }
        }

        // Then try loading from config file
        let config_paths = ["./config.toml", "./tsmerge_config.toml"];
        for path in &config_paths {
            if let Ok(mut file) = File::open(path) {
                let mut content = String::new();
                if file.read_to_string(&mut content).is_ok() {
                    for line in content.lines() {
                        let mut parts = line.splitn(2, '=');
                        let key = parts.next().unwrap_or("").trim();
                        let value = parts.next().unwrap_or("").trim();
                        match key {
                            "scan_packet_budget" => {
                                if let Ok(n) = value.parse() {
                                    config.scan_packet_budget = n;
                                }
                            }
                            "copy_buffer_size" => {
                                if let Ok(n) = value.parse() {
                                    config.copy_buffer_size = n;
                                }
                            }
                            "min_sync_run" => {
                                if let Ok(n) = value.parse() {
                                    config.min_sync_run = n;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        config
    }

    pub fn reload() {
        let new_config = Config::new();
        if let Ok(mut config) = CONFIG.write() {
            *config = new_config;
        }
    }
}

/// Returns a snapshot of the current configuration
pub fn get() -> Config {
    CONFIG.read().unwrap().clone()
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# TSMERGE Configuration
# This is a template. Replace the values with your actual configuration.

scan_packet_budget = 1500
copy_buffer_size = 262144
min_sync_run = 4
"#;
        std::fs::write(path, template)?;
    }
    Ok(())
}
