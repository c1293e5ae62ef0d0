//! Robots.txt parser implementation
//!
//! This module provides functionality for parsing robots.txt content using the robotstxt crate.

use robotstxt::DefaultMatcher;
use std::time::Duration;
use url::Url;

/// Parsed robots.txt data
///
/// `None` content means everything is allowed, which is also what an
/// unreachable or missing robots.txt amounts to.
#[derive(Debug, Clone, Default)]
pub struct ParsedRobots {
    content: Option<String>,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: Some(content.to_string()).filter(|c| !c.trim().is_empty()),
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    pub fn allow_all() -> Self {
        Self { content: None }
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to check
    /// * `user_agent` - The product token, e.g. "UmbraCrawler"
    pub fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        match &self.content {
            None => true,
            Some(content) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(content, user_agent, url.as_str())
            }
        }
    }

    /// Gets the Crawl-delay for a user agent, preferring its own group over `*`
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let content = self.content.as_deref()?;
        let agent = user_agent.to_lowercase();

        let mut group: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_lowercase().as_str() {
                "user-agent" => {
                    // Consecutive User-agent lines share one group
                    if !in_agent_lines {
                        group.clear();
                    }
                    group.push(value.to_lowercase());
                    in_agent_lines = true;
                }
                "crawl-delay" => {
                    in_agent_lines = false;
                    let Ok(secs) = value.parse::<f64>() else {
                        continue;
                    };
                    if !secs.is_finite() || secs < 0.0 {
                        continue;
                    }
                    let delay = Duration::from_secs_f64(secs);
                    if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        specific = Some(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        wildcard = Some(delay);
                    }
                }
                _ => in_agent_lines = false,
            }
        }

        specific.or(wildcard)
    }
}
