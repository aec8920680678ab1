//! Estimate cards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One card from the fixed planning poker deck.
///
/// Numeric cards take part in statistics; `Unknown` ("?") and `Break` ("☕")
/// are only counted in the distribution. Ordering follows deck order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Card {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "13")]
    Thirteen,
    #[serde(rename = "21")]
    TwentyOne,
    #[serde(rename = "?")]
    Unknown,
    #[serde(rename = "☕")]
    Break,
}

impl Card {
    /// The full deck in display order.
    pub const DECK: [Card; 10] = [
        Card::Zero,
        Card::One,
        Card::Two,
        Card::Three,
        Card::Five,
        Card::Eight,
        Card::Thirteen,
        Card::TwentyOne,
        Card::Unknown,
        Card::Break,
    ];

    /// Returns the literal card face.
    pub fn as_str(&self) -> &'static str {
        match self {
            Card::Zero => "0",
            Card::One => "1",
            Card::Two => "2",
            Card::Three => "3",
            Card::Five => "5",
            Card::Eight => "8",
            Card::Thirteen => "13",
            Card::TwentyOne => "21",
            Card::Unknown => "?",
            Card::Break => "☕",
        }
    }

    /// Returns the numeric value, or `None` for the sentinel cards.
    pub fn numeric_value(&self) -> Option<u32> {
        match self {
            Card::Zero => Some(0),
            Card::One => Some(1),
            Card::Two => Some(2),
            Card::Three => Some(3),
            Card::Five => Some(5),
            Card::Eight => Some(8),
            Card::Thirteen => Some(13),
            Card::TwentyOne => Some(21),
            Card::Unknown | Card::Break => None,
        }
    }

    /// Returns the numeric card with the given value, if the deck has one.
    pub fn from_numeric(value: u32) -> Option<Card> {
        Card::DECK
            .iter()
            .copied()
            .find(|card| card.numeric_value() == Some(value))
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not a card face.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid card")]
pub struct UnknownCard(pub String);

impl FromStr for Card {
    type Err = UnknownCard;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Card::DECK
            .iter()
            .copied()
            .find(|card| card.as_str() == s)
            .ok_or_else(|| UnknownCard(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_face_parses_back_to_its_card() {
        for card in Card::DECK {
            assert_eq!(card.as_str().parse::<Card>(), Ok(card));
        }
    }

    #[test]
    fn rejects_values_outside_the_deck() {
        assert!("4".parse::<Card>().is_err());
        assert!("".parse::<Card>().is_err());
        assert!(" 5".parse::<Card>().is_err());
    }

    #[test]
    fn sentinels_have_no_numeric_value() {
        assert_eq!(Card::Unknown.numeric_value(), None);
        assert_eq!(Card::Break.numeric_value(), None);
        assert_eq!(Card::Thirteen.numeric_value(), Some(13));
    }

    #[test]
    fn from_numeric_only_finds_deck_values() {
        assert_eq!(Card::from_numeric(8), Some(Card::Eight));
        assert_eq!(Card::from_numeric(4), None);
    }

    #[test]
    fn serializes_as_card_face() {
        assert_eq!(serde_json::to_string(&Card::Break).unwrap(), "\"☕\"");
        assert_eq!(serde_json::to_string(&Card::TwentyOne).unwrap(), "\"21\"");
        let parsed: Card = serde_json::from_str("\"?\"").unwrap();
        assert_eq!(parsed, Card::Unknown);
    }
}
