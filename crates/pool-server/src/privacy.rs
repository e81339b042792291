//! Participant visibility and address truncation
//!
//! Visibility is an opt-out model: a participant is public unless their
//! registry row explicitly says otherwise. Both "no registry row" and "row
//! with an unset flag" resolve to public, as separate branches so the rule
//! stays auditable.

use crate::models::MonitoredParticipant;

/// Characters kept on each side of the truncated address.
const KEEP: usize = 4;

pub fn is_public(participant: Option<&MonitoredParticipant>) -> bool {
    match participant {
        // Never observed by the registry: public by default.
        None => true,
        Some(p) => match p.is_public {
            // Flag never set: public by default.
            None => true,
            Some(public) => public,
        },
    }
}

/// Masks an address for public display, keeping the first and last four
/// characters. Total: never panics, short inputs are returned unchanged.
pub fn truncate(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= KEEP * 2 {
        return address.to_string();
    }
    let head: String = chars[..KEEP].iter().collect();
    let tail: String = chars[chars.len() - KEEP..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(is_public: Option<bool>) -> MonitoredParticipant {
        MonitoredParticipant {
            address: "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4".to_string(),
            is_active: true,
            is_public,
            best_difficulty: 0.0,
            blocks_participated: 0,
            first_seen: 0,
            updated_at: None,
        }
    }

    #[test]
    fn test_is_public_tri_state() {
        assert!(is_public(None));
        assert!(is_public(Some(&participant(None))));
        assert!(is_public(Some(&participant(Some(true)))));
        assert!(!is_public(Some(&participant(Some(false)))));
    }

    #[test]
    fn test_truncate_long_address() {
        let truncated = truncate("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
        assert_eq!(truncated, "bc1q...f3t4");
    }

    #[test]
    fn test_truncate_short_inputs_unchanged() {
        assert_eq!(truncate(""), "");
        assert_eq!(truncate("abc"), "abc");
        assert_eq!(truncate("12345678"), "12345678");
    }

    #[test]
    fn test_truncate_total_over_lengths() {
        for len in 0..=100 {
            let address: String = "a".repeat(len);
            let truncated = truncate(&address);
            if len > 8 {
                assert!(truncated.contains("..."), "length {} missing separator", len);
                assert_eq!(truncated.chars().count(), 11);
            } else {
                assert_eq!(truncated, address);
            }
        }
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        // Must split on char boundaries, not bytes.
        let truncated = truncate("ブロックチェーンアドレス");
        assert!(truncated.contains("..."));
    }
}
