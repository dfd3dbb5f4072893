use rand::{seq::IndexedRandom, Rng};

const ADJECTIVES: [&str; 45] = [
    "Swift", "Bold", "Bright", "Cool", "Dark", "Epic", "Fire", "Golden",
    "Happy", "Iron", "Jade", "Lucky", "Mystic", "Noble", "Ocean", "Prime",
    "Quick", "Royal", "Silent", "Thunder", "Ultra", "Vivid", "Wild", "Zenith",
    "Cosmic", "Cyber", "Digital", "Electric", "Neon", "Quantum", "Stellar",
    "Turbo", "Velocity", "Shadow", "Phoenix", "Dragon", "Tiger", "Wolf",
    "Raven", "Falcon", "Viper", "Crimson", "Azure", "Emerald", "Silver",
];

const NOUNS: [&str; 45] = [
    "Warrior", "Hunter", "Ranger", "Knight", "Wizard", "Ninja", "Samurai",
    "Pirate", "Rider", "Guardian", "Champion", "Master", "Legend", "Hero",
    "Rebel", "Spirit", "Ghost", "Storm", "Blade", "Arrow", "Hammer", "Shield",
    "Sword", "Fist", "Titan", "Giant", "Demon", "Angel", "Beast", "Phoenix",
    "Dragon", "Tiger", "Wolf", "Bear", "Lion", "Eagle", "Hawk", "Panther",
    "Viper", "Cobra", "Raptor", "Spartan", "Viking", "Ronin", "Shogun",
];

/// `AdjectiveNoun123`, number in 100..=999.
pub fn generate_username<R: Rng>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Silent");
    let noun = NOUNS.choose(rng).copied().unwrap_or("Ghost");
    let number: u16 = rng.random_range(100..=999);

    format!("{adjective}{noun}{number}")
}

pub fn random_username() -> String {
    generate_username(&mut rand::rng())
}
