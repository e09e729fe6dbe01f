//! `quotesync.ini` loading.
//!
//! Blank values read as absent so that `access_token =` is reported as a
//! missing key. Integer keys that do not parse fall back to the caller's
//! default with a warning.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;
use tracing::warn;

pub struct FileConfigAdapter {
    ini: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut ini = Ini::new();
        ini.load(path).map_err(std::io::Error::other)?;
        Ok(Self { ini })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut ini = Ini::new();
        ini.read(content.to_string())?;
        Ok(Self { ini })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        let Some(raw) = self.get_string(section, key) else {
            return default;
        };
        match raw.parse::<i64>() {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    section,
                    key,
                    value = %raw,
                    error = %e,
                    default,
                    "config value is not an integer, using default"
                );
                default
            }
        }
    }
}
