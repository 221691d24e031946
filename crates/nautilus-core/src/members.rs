//! Member list parsing.
//!
//! A cluster's membership arrives as a single comma-separated join string
//! (`"10.0.0.1,10.0.0.2"`). Order is preserved.

use crate::error::{ConfigError, ConfigResult};

/// Split a join string into the ordered list of node addresses.
///
/// Segments are trimmed. A blank string is the empty member list; a blank
/// segment between other addresses is rejected.
pub fn parse_members(join: &str) -> ConfigResult<Vec<String>> {
    if join.trim().is_empty() {
        return Ok(Vec::new());
    }

    join.split(',')
        .enumerate()
        .map(|(index, segment)| {
            let address = segment.trim();
            if address.is_empty() {
                return Err(ConfigError::InvalidMemberList {
                    join: join.to_string(),
                    reason: format!("empty address at position {index}"),
                });
            }
            if address.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidMemberList {
                    join: join.to_string(),
                    reason: format!("address {address:?} contains whitespace"),
                });
            }
            Ok(address.to_string())
        })
        .collect()
}
