//! Per-worker robots.txt policy
//!
//! A host worker builds one [`RobotsPolicy`] from its first item and keeps it
//! for the rest of its life. A worker relaunched after idling fetches
//! robots.txt again.

use crate::robots::ParsedRobots;
use std::time::Duration;

/// Robots.txt rules resolved for one robots agent token
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    /// The parsed robots.txt content
    pub rules: ParsedRobots,

    /// Agent token the rules are evaluated for
    pub agent: String,

    /// `Crawl-delay` of the agent's group, if any
    pub crawl_delay: Option<Duration>,
}

impl RobotsPolicy {
    /// Builds the policy of `agent` from parsed rules
    pub fn new(rules: ParsedRobots, agent: &str) -> Self {
        let crawl_delay = rules.crawl_delay(agent);
        Self {
            rules,
            agent: agent.to_string(),
            crawl_delay,
        }
    }

    /// Parses robots.txt content and builds the policy of `agent`
    pub fn from_content(content: &str, agent: &str) -> Self {
        Self::new(ParsedRobots::from_content(content), agent)
    }

    /// Checks a URL (absolute, or path plus query) against the agent's rules
    pub fn is_allowed(&self, url: &str) -> bool {
        self.rules.is_allowed(url, &self.agent)
    }
}
