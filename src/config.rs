use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration};

use serde_json as sj;

use crate::error::*;

// Batch geometry the kernel module is built for
pub const WORK_TOTAL_SIZE : u32 = 16;
pub const WORKGROUP_SIZE : u32 = 16;

pub const DEFAULT_KERNEL : &str = "ed25519.spv";
pub const DEFAULT_TIMEOUT : Duration = Duration::from_secs(100);


// Dispatch parameters
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub total_work_items  : u32,
    pub workgroup_size    : u32,
    pub kernel_path       : PathBuf,
    pub timeout           : Duration,
    pub validation        : bool,
    pub adapter_index     : Option<u32>,
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self {
            total_work_items  : WORK_TOTAL_SIZE,
            workgroup_size    : WORKGROUP_SIZE,
            kernel_path       : PathBuf::from(DEFAULT_KERNEL),
            timeout           : DEFAULT_TIMEOUT,
            validation        : cfg!(debug_assertions),
            adapter_index     : None,
        }
    }

    pub fn total_work_items(mut self, count : u32) -> Self {
        self.total_work_items = count;
        self
    }

    pub fn workgroup_size(mut self, size : u32) -> Self {
        self.workgroup_size = size;
        self
    }

    pub fn kernel_path(mut self, path : impl Into<PathBuf>) -> Self {
        self.kernel_path = path.into();
        self
    }

    pub fn timeout(mut self, timeout : Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validation(mut self, enable : bool) -> Self {
        self.validation = enable;
        self
    }

    pub fn adapter_index(mut self, index : Option<u32>) -> Self {
        self.adapter_index = index;
        self
    }

    // Reads a JSON config file. Keys that are not present keep their
    // default value. Relative kernel paths resolve against the file.
    pub fn from_json_file(path : &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        let json : sj::Value = sj::from_str(&text).map_err(
            |e| Error::Config(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::new().apply_json(&json)?;

        if config.kernel_path.is_relative() && json.get("kernel").is_some() {
            if let Some(base) = path.parent() {
                config.kernel_path = base.join(&config.kernel_path);
            }
        }

        Ok(config)
    }

    // Overrides fields with the keys present in a JSON object
    pub fn apply_json(mut self, json : &sj::Value) -> Result<Self> {
        let sj::Value::Object(obj) = json else {
            return Err(Error::Config(format!("Expected object, got: {json}")));
        };

        for (key, value) in obj {
            match key.as_str() {
                "kernel" => {
                    let sj::Value::String(s) = value else {
                        return Err(Error::Config(format!("Invalid kernel path: {value}")));
                    };

                    self.kernel_path = PathBuf::from(s);
                },

                "work-items" => {
                    self.total_work_items = Self::parse_u32(key, value)?;
                },

                "workgroup-size" => {
                    self.workgroup_size = Self::parse_u32(key, value)?;
                },

                "timeout-ms" => {
                    let ms = value.as_u64()
                        .ok_or_else(|| Error::Config(format!("Invalid {key}: {value}")))?;
                    self.timeout = Duration::from_millis(ms);
                },

                "validation" => {
                    self.validation = value.as_bool()
                        .ok_or_else(|| Error::Config(format!("Invalid {key}: {value}")))?;
                },

                "adapter" => {
                    self.adapter_index = match value {
                        sj::Value::Null => None,
                        _ => Some(Self::parse_u32(key, value)?),
                    };
                },

                _ => {
                    return Err(Error::Config(format!("Unknown key '{key}'")));
                },
            }
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.total_work_items == 0 {
            return Err(Error::Config("Work item count must be non-zero".into()));
        }

        if self.workgroup_size == 0 {
            return Err(Error::Config("Workgroup size must be non-zero".into()));
        }

        if self.timeout.is_zero() {
            return Err(Error::Config("Timeout must be non-zero".into()));
        }

        Ok(())
    }

    fn parse_u32(key : &str, value : &sj::Value) -> Result<u32> {
        value.as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| Error::Config(format!("Invalid {key}: {value}")))
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_batch() {
        let config = DispatchConfig::new();

        assert_eq!(config.total_work_items, 16);
        assert_eq!(config.workgroup_size, 16);
        assert_eq!(config.timeout, Duration::from_secs(100));
        assert_eq!(config.kernel_path, PathBuf::from("ed25519.spv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_overrides_present_keys_only() {
        let json = sj::json!({
            "work-items"  : 17,
            "timeout-ms"  : 1500,
            "validation"  : false,
        });

        let config = DispatchConfig::new().apply_json(&json).unwrap();

        assert_eq!(config.total_work_items, 17);
        assert_eq!(config.workgroup_size, WORKGROUP_SIZE);
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert!(!config.validation);
        assert_eq!(config.adapter_index, None);
    }

    #[test]
    fn rejects_unknown_and_malformed_keys() {
        let unknown = DispatchConfig::new().apply_json(&sj::json!({ "width" : 800 }));
        assert!(matches!(unknown, Err(Error::Config(_))));

        let negative = DispatchConfig::new().apply_json(&sj::json!({ "work-items" : -1 }));
        assert!(matches!(negative, Err(Error::Config(_))));

        let too_large = DispatchConfig::new().apply_json(&sj::json!({ "workgroup-size" : 1u64 << 33 }));
        assert!(matches!(too_large, Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_geometry() {
        assert!(DispatchConfig::new().workgroup_size(0).validate().is_err());
        assert!(DispatchConfig::new().total_work_items(0).validate().is_err());
        assert!(DispatchConfig::new().timeout(Duration::ZERO).validate().is_err());
    }
}
