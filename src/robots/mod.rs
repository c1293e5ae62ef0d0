//! Robots.txt handling module
//!
//! A site crawl fetches robots.txt once, through the same client (and so the
//! same proxy) as its pages, and consults it before every request.

mod parser;

pub use parser::ParsedRobots;

use reqwest::Client;
use url::Url;

/// Fetches and parses robots.txt for the site `site_url` belongs to
///
/// Anything short of a successful response (404, 5xx, timeout, a proxy
/// that can't reach the site) means the site sets no rules.
pub async fn fetch_robots(client: &Client, site_url: &Url) -> ParsedRobots {
    let Ok(robots_url) = site_url.join("/robots.txt") else {
        return ParsedRobots::allow_all();
    };

    let response = match client.get(robots_url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(url = %robots_url, "robots.txt unreachable, allowing all: {}", e);
            return ParsedRobots::allow_all();
        }
    };

    if !response.status().is_success() {
        tracing::debug!(
            url = %robots_url,
            status = response.status().as_u16(),
            "No robots.txt, allowing all"
        );
        return ParsedRobots::allow_all();
    }

    match response.text().await {
        Ok(body) => ParsedRobots::from_content(&body),
        Err(e) => {
            tracing::debug!(url = %robots_url, "Failed to read robots.txt: {}", e);
            ParsedRobots::allow_all()
        }
    }
}
