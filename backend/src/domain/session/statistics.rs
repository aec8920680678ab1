//! Aggregate statistics over a set of votes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Card;

/// Summary of a set of revealed votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteStatistics {
    /// Mean of the numeric votes, one decimal place.
    pub average: Option<f64>,
    pub min: Option<Card>,
    pub max: Option<Card>,
    /// True when at least one numeric vote was cast and all numeric votes agree.
    /// Sentinel cards are ignored here.
    pub consensus: bool,
    /// Count per card across every vote, sentinels included.
    pub distribution: BTreeMap<Card, u32>,
}

impl VoteStatistics {
    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Card>) -> Self {
        let mut distribution = BTreeMap::new();
        let mut numeric = Vec::new();

        for card in votes {
            *distribution.entry(*card).or_insert(0) += 1;
            if let Some(value) = card.numeric_value() {
                numeric.push(value);
            }
        }

        let min = numeric.iter().min().copied();
        let max = numeric.iter().max().copied();
        let average = if numeric.is_empty() {
            None
        } else {
            let sum: u32 = numeric.iter().sum();
            let mean = f64::from(sum) / numeric.len() as f64;
            Some((mean * 10.0).round() / 10.0)
        };

        Self {
            average,
            min: min.and_then(Card::from_numeric),
            max: max.and_then(Card::from_numeric),
            consensus: min.is_some() && min == max,
            distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_numeric_votes() {
        let stats = VoteStatistics::from_votes(&[Card::Five, Card::Five, Card::Eight]);

        assert_eq!(stats.average, Some(6.0));
        assert_eq!(stats.min, Some(Card::Five));
        assert_eq!(stats.max, Some(Card::Eight));
        assert!(!stats.consensus);
        assert_eq!(stats.distribution.get(&Card::Five), Some(&2));
        assert_eq!(stats.distribution.get(&Card::Eight), Some(&1));
        assert_eq!(stats.distribution.len(), 2);
    }

    #[test]
    fn unanimous_votes_reach_consensus() {
        let stats = VoteStatistics::from_votes(&[Card::Three, Card::Three]);

        assert_eq!(stats.average, Some(3.0));
        assert_eq!(stats.min, Some(Card::Three));
        assert_eq!(stats.max, Some(Card::Three));
        assert!(stats.consensus);
    }

    #[test]
    fn sentinel_only_votes_have_no_numbers() {
        let stats = VoteStatistics::from_votes(&[Card::Unknown, Card::Break]);

        assert_eq!(stats.average, None);
        assert_eq!(stats.min, None);
        assert_eq!(stats.max, None);
        assert!(!stats.consensus);
        assert_eq!(stats.distribution.get(&Card::Unknown), Some(&1));
        assert_eq!(stats.distribution.get(&Card::Break), Some(&1));
    }

    #[test]
    fn sentinels_do_not_break_numeric_consensus() {
        let stats = VoteStatistics::from_votes(&[Card::Eight, Card::Unknown]);

        assert!(stats.consensus);
        assert_eq!(stats.average, Some(8.0));
    }

    #[test]
    fn average_rounds_to_one_decimal() {
        let stats = VoteStatistics::from_votes(&[Card::One, Card::Two, Card::Two]);
        assert_eq!(stats.average, Some(1.7));
    }

    #[test]
    fn no_votes_yield_empty_statistics() {
        let stats = VoteStatistics::from_votes(std::iter::empty());

        assert_eq!(stats.average, None);
        assert!(!stats.consensus);
        assert!(stats.distribution.is_empty());
    }

    #[test]
    fn distribution_serializes_with_card_faces() {
        let stats = VoteStatistics::from_votes(&[Card::Unknown, Card::Break]);
        let json = serde_json::to_value(&stats).unwrap();

        assert_eq!(json["distribution"], serde_json::json!({"?": 1, "☕": 1}));
        assert!(json["average"].is_null());
    }
}
