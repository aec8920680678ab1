//! Random `AdjectiveNoun` nicknames, e.g. `SwiftPanda`.

use rand::seq::SliceRandom;

use crate::domain::session::Nickname;
use crate::ports::NicknameGenerator;

const ADJECTIVES: [&str; 30] = [
    "Swift", "Brave", "Clever", "Gentle", "Happy", "Mighty", "Noble", "Quick", "Silent", "Wise",
    "Bold", "Calm", "Eager", "Fierce", "Jolly", "Kind", "Lively", "Proud", "Sharp", "Witty",
    "Agile", "Bright", "Daring", "Epic", "Focused", "Graceful", "Honest", "Keen", "Lucky",
    "Nimble",
];

const NOUNS: [&str; 30] = [
    "Panda", "Owl", "Fox", "Wolf", "Bear", "Eagle", "Tiger", "Lion", "Hawk", "Shark", "Dragon",
    "Phoenix", "Falcon", "Raven", "Cobra", "Leopard", "Panther", "Jaguar", "Lynx", "Otter",
    "Badger", "Raccoon", "Beaver", "Bison", "Moose", "Dolphin", "Whale", "Octopus", "Mantis",
    "Spider",
];

/// Picks one adjective and one noun uniformly at random.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomNicknameGenerator;

impl RandomNicknameGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl NicknameGenerator for RandomNicknameGenerator {
    fn generate(&self) -> Nickname {
        let mut rng = rand::thread_rng();
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Swift");
        let noun = NOUNS.choose(&mut rng).copied().unwrap_or("Panda");
        Nickname::parse(&format!("{}{}", adjective, noun)).expect("word lists hold non-empty words")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::MAX_NICKNAME_LENGTH;

    fn split(nickname: &str) -> Option<(&str, &str)> {
        ADJECTIVES
            .iter()
            .find_map(|adj| nickname.strip_prefix(adj).map(|rest| (*adj, rest)))
    }

    #[test]
    fn generated_nickname_is_adjective_then_noun() {
        let generator = RandomNicknameGenerator::new();
        for _ in 0..100 {
            let nickname = generator.generate();
            let (_, noun) = split(nickname.as_str()).expect("starts with an adjective");
            assert!(NOUNS.contains(&noun), "{} has unknown noun", nickname.as_str());
        }
    }

    #[test]
    fn every_combination_fits_a_nickname() {
        let longest = ADJECTIVES.iter().map(|a| a.len()).max().unwrap()
            + NOUNS.iter().map(|n| n.len()).max().unwrap();
        assert!(longest <= MAX_NICKNAME_LENGTH);
    }

    #[test]
    fn generator_produces_variety() {
        let generator = RandomNicknameGenerator::new();
        let distinct: std::collections::HashSet<_> =
            (0..50).map(|_| generator.generate().as_str().to_string()).collect();
        assert!(distinct.len() > 1);
    }
}
