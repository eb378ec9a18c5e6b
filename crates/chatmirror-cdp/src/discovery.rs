//! Target discovery over the DevTools HTTP endpoint.

use std::time::Duration;

use chatmirror_config::DevtoolsConfig;
use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::CdpError;
use crate::protocol::{Target, TargetDescriptor};

const LIST_TIMEOUT: Duration = Duration::from_secs(3);

/// Application signature used to pick the IDE page among a port's targets.
#[derive(Debug, Clone)]
pub struct TargetFilter {
    url_pattern: String,
    title_exclude: Regex,
}

impl TargetFilter {
    pub fn new(url_pattern: impl Into<String>, title_exclude: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            url_pattern: url_pattern.into(),
            title_exclude: Regex::new(title_exclude)?,
        })
    }

    fn matches_url(&self, target: &Target) -> bool {
        !self.url_pattern.is_empty() && target.url.contains(&self.url_pattern)
    }

    fn matches_title(&self, target: &Target) -> bool {
        !target.title.is_empty()
            && !self.title_exclude.is_match(&target.title)
            && target.url != "about:blank"
    }

    /// Pick the target to attach to. The first tier with a match wins and
    /// within a tier list order decides.
    pub fn select<'a>(&self, targets: &'a [Target]) -> Option<&'a Target> {
        let pages: Vec<&Target> = targets.iter().filter(|t| t.is_page()).collect();
        pages
            .iter()
            .find(|t| self.matches_url(t))
            .or_else(|| pages.iter().find(|t| self.matches_title(t)))
            .copied()
    }

    /// Title worth showing for a target, or `None` when it is blank or
    /// matches the exclusion pattern.
    fn display_title(&self, target: &Target) -> Option<String> {
        let title = target.title.trim();
        if title.is_empty() || self.title_exclude.is_match(title) {
            None
        } else {
            Some(title.to_string())
        }
    }
}

/// One configured debug port as shown in the slot list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    pub port: u16,
    pub running: bool,
    pub title: String,
}

/// Lists and selects targets on the configured DevTools host.
#[derive(Debug, Clone)]
pub struct Discovery {
    client: reqwest::Client,
    host: String,
    filter: TargetFilter,
}

impl Discovery {
    pub fn new(host: impl Into<String>, filter: TargetFilter) -> Self {
        let client = reqwest::Client::builder()
            .timeout(LIST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            host: host.into(),
            filter,
        }
    }

    pub fn from_config(config: &DevtoolsConfig) -> Result<Self, regex::Error> {
        let filter = TargetFilter::new(config.url_pattern.clone(), &config.title_exclude)?;
        Ok(Self::new(config.host.clone(), filter))
    }

    pub fn filter(&self) -> &TargetFilter {
        &self.filter
    }

    /// Fetch `/json/list` for a port.
    pub async fn list_targets(&self, port: u16) -> Result<Vec<Target>, CdpError> {
        let url = format!("http://{}:{}/json/list", self.host, port);
        trace!("Listing targets at {}", url);

        let unreachable = |e: reqwest::Error| CdpError::Unreachable {
            port,
            reason: e.to_string(),
        };

        let descriptors: Vec<TargetDescriptor> = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(unreachable)?
            .json()
            .await
            .map_err(unreachable)?;

        let targets: Vec<Target> = descriptors
            .into_iter()
            .filter_map(|desc| Target::from_descriptor(port, desc))
            .collect();
        debug!("Port {} lists {} attachable targets", port, targets.len());
        Ok(targets)
    }

    /// Choose the IDE page among `targets`.
    pub fn select_target(&self, port: u16, targets: &[Target]) -> Result<Target, CdpError> {
        self.filter
            .select(targets)
            .cloned()
            .ok_or(CdpError::NotFound { port })
    }

    /// List and select in one step.
    pub async fn discover(&self, port: u16) -> Result<Target, CdpError> {
        let targets = self.list_targets(port).await?;
        let target = self.select_target(port, &targets)?;
        debug!("Selected target {} ({}) on port {}", target.id, target.title, port);
        Ok(target)
    }

    /// Probe every port concurrently. Unreachable ports are reported as not
    /// running.
    pub async fn scan_slots(&self, ports: &[u16]) -> Vec<SlotInfo> {
        join_all(ports.iter().map(|&port| self.probe_slot(port))).await
    }

    async fn probe_slot(&self, port: u16) -> SlotInfo {
        match self.list_targets(port).await {
            Ok(targets) => {
                let title = self
                    .filter
                    .select(&targets)
                    .and_then(|t| self.filter.display_title(t))
                    .unwrap_or_else(|| format!("IDE (Port {})", port));
                SlotInfo {
                    port,
                    running: true,
                    title,
                }
            }
            Err(e) => {
                trace!("Slot {} not running: {}", port, e);
                SlotInfo {
                    port,
                    running: false,
                    title: format!("Slot {}", port),
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
