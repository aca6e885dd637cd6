//! Robots.txt handling module
//!
//! This module parses robots.txt files and resolves the rules and crawl delay
//! that apply to the crawler's robots agent token.

mod cache;
mod parser;

pub use cache::RobotsPolicy;
pub use parser::ParsedRobots;

use std::str::Utf8Error;

/// Builds a policy from a robots.txt response
///
/// Only a 2xx response yields rules. Any other status means there is no
/// usable robots.txt and everything is allowed, which is reported as
/// `Ok(None)`. A body that is not UTF-8 is an error.
pub fn policy_from_response(
    status: u16,
    body: &[u8],
    agent: &str,
) -> Result<Option<RobotsPolicy>, Utf8Error> {
    if !(200..300).contains(&status) {
        return Ok(None);
    }

    let content = std::str::from_utf8(body)?;
    Ok(Some(RobotsPolicy::from_content(content, agent)))
}
