//! Device profiles the preview shell can emulate.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    pub name: String,
    pub viewport: Viewport,
    #[serde(default = "default_scale_factor")]
    pub device_scale_factor: f32,
    pub user_agent: String,
    #[serde(default)]
    pub is_mobile: bool,
    #[serde(default)]
    pub has_touch: bool,
}

fn default_scale_factor() -> f32 {
    1.0
}

impl DeviceProfile {
    /// Reject profiles the shell could not size a window for.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() || self.user_agent.trim().is_empty() {
            return Err("missing required fields (name, viewport, userAgent)".to_string());
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(format!(
                "invalid device \"{}\": viewport must have width and height",
                self.name
            ));
        }
        Ok(())
    }

    /// First `max_chars` characters of the user agent, cut on a char boundary.
    pub fn user_agent_preview(&self, max_chars: usize) -> String {
        self.user_agent.chars().take(max_chars).collect()
    }

    pub fn category(&self) -> DeviceCategory {
        let lower = self.name.to_lowercase();
        if lower.contains("iphone") {
            DeviceCategory::IPhone
        } else if lower.contains("ipad") {
            DeviceCategory::IPad
        } else if lower.contains("pixel") || lower.contains("galaxy") {
            DeviceCategory::Android
        } else {
            DeviceCategory::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceCategory {
    IPhone,
    IPad,
    Android,
    Other,
}

impl DeviceCategory {
    pub fn label(self) -> &'static str {
        match self {
            DeviceCategory::IPhone => "iPhone",
            DeviceCategory::IPad => "iPad",
            DeviceCategory::Android => "Android",
            DeviceCategory::Other => "Other",
        }
    }
}

#[derive(Debug, Deserialize)]
struct DevicesFile {
    #[serde(default)]
    devices: Vec<DeviceProfile>,
}

const IOS_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";
const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";

fn android_ua(model: &str) -> String {
    format!(
        "Mozilla/5.0 (Linux; Android 13; {model}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Mobile Safari/537.36"
    )
}

fn builtin(name: &str, width: u32, height: u32, scale: f32, ua: &str) -> DeviceProfile {
    DeviceProfile {
        name: name.to_string(),
        viewport: Viewport { width, height },
        device_scale_factor: scale,
        user_agent: ua.to_string(),
        is_mobile: true,
        has_touch: true,
    }
}

/// Built-in profiles followed by custom ones; a custom profile replaces a
/// built-in of the same name.
#[derive(Debug, Clone)]
pub struct DeviceCatalog {
    builtin: IndexMap<String, DeviceProfile>,
    custom: IndexMap<String, DeviceProfile>,
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DeviceCatalog {
    pub fn builtin() -> Self {
        let devices = vec![
            builtin("iPhone SE", 375, 667, 2.0, IOS_UA),
            builtin("iPhone 12", 390, 844, 3.0, IOS_UA),
            builtin("iPhone 13", 390, 844, 3.0, IOS_UA),
            builtin("iPhone 14", 390, 844, 3.0, IOS_UA),
            builtin("iPhone 14 Pro Max", 430, 932, 3.0, IOS_UA),
            builtin("iPad", 810, 1080, 2.0, IPAD_UA),
            builtin("iPad Pro", 1024, 1366, 2.0, IPAD_UA),
            builtin("Pixel 5", 393, 851, 2.75, &android_ua("Pixel 5")),
            builtin("Pixel 7", 412, 915, 2.625, &android_ua("Pixel 7")),
            builtin("Galaxy S20", 360, 800, 3.0, &android_ua("SM-G981B")),
        ];
        Self {
            builtin: devices.into_iter().map(|d| (d.name.clone(), d)).collect(),
            custom: IndexMap::new(),
        }
    }

    /// Load `{ "devices": [...] }` from `path`. Invalid entries are skipped
    /// with a warning; returns how many were added.
    pub fn load_custom(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read devices file: {}", path.display()))?;
        let file: DevicesFile = serde_json::from_str(&content)
            .with_context(|| format!("invalid devices file: {}", path.display()))?;

        let mut added = 0;
        for device in file.devices {
            match device.validate() {
                Ok(()) => {
                    self.custom.insert(device.name.clone(), device);
                    added += 1;
                }
                Err(reason) => warn!(%reason, "skipping custom device"),
            }
        }
        Ok(added)
    }

    /// All devices, custom entries overriding built-ins.
    pub fn all(&self) -> IndexMap<&str, &DeviceProfile> {
        let mut all: IndexMap<&str, &DeviceProfile> =
            self.builtin.iter().map(|(k, v)| (k.as_str(), v)).collect();
        for (k, v) in &self.custom {
            all.insert(k.as_str(), v);
        }
        all
    }

    pub fn is_custom(&self, name: &str) -> bool {
        self.custom.contains_key(name)
    }

    /// Look a device up by exact name, then case-insensitively, by prefix,
    /// by substring, and finally by every query word appearing in the name.
    pub fn find(&self, query: &str) -> Option<&DeviceProfile> {
        let all = self.all();
        if let Some(d) = all.get(query) {
            return Some(*d);
        }

        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return None;
        }
        let names: Vec<(&str, String)> = all.keys().map(|n| (*n, n.to_lowercase())).collect();
        let words: Vec<&str> = q.split_whitespace().collect();

        let hit = names
            .iter()
            .find(|(_, n)| *n == q)
            .or_else(|| names.iter().find(|(_, n)| n.starts_with(&q)))
            .or_else(|| names.iter().find(|(_, n)| n.contains(&q)))
            .or_else(|| {
                names.iter().find(|(_, n)| {
                    let name_words: Vec<&str> = n.split_whitespace().collect();
                    words
                        .iter()
                        .all(|w| name_words.iter().any(|nw| nw.contains(w)))
                })
            })?;

        if hit.0 != query {
            info!(device = hit.0, query, "using closest device match");
        }
        all.get(hit.0).copied()
    }
}
