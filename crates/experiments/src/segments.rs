//! Visitor segments used by experiment audience filters.
//!
//! A segment label has two parts, `<visit>-<device>`, e.g. `returning-mobile`.
//! A filter entry matches the whole label or either part.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    /// Coarse classification from a User-Agent header.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ua.contains("ipad") || ua.contains("tablet") || (ua.contains("android") && !ua.contains("mobile")) {
            DeviceClass::Tablet
        } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Desktop => "desktop",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisitorContext {
    pub is_returning: bool,
    pub device: DeviceClass,
}

impl VisitorContext {
    pub fn new(is_returning: bool, device: DeviceClass) -> Self {
        Self {
            is_returning,
            device,
        }
    }

    pub fn segment(&self) -> String {
        let visit = if self.is_returning { "returning" } else { "new" };
        format!("{visit}-{}", self.device.as_str())
    }

    /// Empty filters admit everyone.
    pub fn matches_any(&self, filters: &[String]) -> bool {
        if filters.is_empty() {
            return true;
        }
        let label = self.segment();
        let (visit, device) = label.split_once('-').unwrap_or((label.as_str(), ""));
        filters
            .iter()
            .any(|f| f == &label || f == visit || f == device)
    }
}

impl Default for VisitorContext {
    fn default() -> Self {
        Self::new(false, DeviceClass::Desktop)
    }
}
