//! Robots.txt parser implementation
//!
//! Rule matching is delegated to the robotstxt crate. The `Crawl-delay`
//! extension is not part of that crate, so it is scanned here.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content
    content: String,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to check, absolute or as a path (e.g., "/page.html")
    /// * `user_agent` - The robots.txt agent token
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// A group naming the agent wins over the `*` group. Consecutive
    /// `User-agent` lines form one group; any other directive closes the list
    /// of agents for the group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.content.is_empty() {
            return None;
        }

        let mut current_user_agents: Vec<String> = Vec::new();
        let mut in_group_body = false;
        let mut crawl_delay_for_wildcard: Option<f64> = None;
        let mut crawl_delay_for_agent: Option<f64> = None;

        let normalized_agent = user_agent.to_lowercase();

        for line in self.content.lines() {
            let trimmed = match line.split_once('#') {
                Some((before, _)) => before.trim(),
                None => line.trim(),
            };

            if trimmed.is_empty() {
                continue;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if in_group_body {
                        current_user_agents.clear();
                        in_group_body = false;
                    }
                    let token = value.split('/').next().unwrap_or(value);
                    current_user_agents.push(token.trim().to_lowercase());
                }
                "crawl-delay" => {
                    in_group_body = true;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if !delay.is_finite() || delay < 0.0 {
                        continue;
                    }
                    if current_user_agents.iter().any(|ua| *ua == normalized_agent) {
                        crawl_delay_for_agent = Some(delay);
                    } else if current_user_agents.iter().any(|ua| ua == "*") {
                        crawl_delay_for_wildcard = Some(delay);
                    }
                }
                _ => {
                    in_group_body = true;
                }
            }
        }

        crawl_delay_for_agent
            .or(crawl_delay_for_wildcard)
            .map(Duration::from_secs_f64)
    }
}
