//! Ability scores and modifier arithmetic.

use serde::{Deserialize, Serialize};

/// The six abilities an action can be judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    /// Physical power, lifting, breaking.
    Strength,
    /// Evasion, aim, fine motor work.
    Dexterity,
    /// Stamina, poison resistance.
    Constitution,
    /// Knowledge, arcana comprehension.
    Intelligence,
    /// Intuition, perception, willpower.
    Wisdom,
    /// Persuasion, deception, presence.
    Charisma,
}

impl Ability {
    /// Returns the wire name for this ability.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strength => "strength",
            Self::Dexterity => "dexterity",
            Self::Constitution => "constitution",
            Self::Intelligence => "intelligence",
            Self::Wisdom => "wisdom",
            Self::Charisma => "charisma",
        }
    }
}

/// A character's six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    /// Strength score.
    pub strength: i32,
    /// Dexterity score.
    pub dexterity: i32,
    /// Constitution score.
    pub constitution: i32,
    /// Intelligence score.
    pub intelligence: i32,
    /// Wisdom score.
    pub wisdom: i32,
    /// Charisma score.
    pub charisma: i32,
}

impl AbilityScores {
    /// Returns the score for the given ability.
    #[must_use]
    pub fn score(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }
}

impl Default for AbilityScores {
    /// All scores at the baseline of 10 (modifier 0).
    fn default() -> Self {
        Self {
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
        }
    }
}

/// A temporary buff or debuff adjusting a character's roll modifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    /// Display name of the effect.
    pub name: String,
    /// Flat modifier contributed by this effect.
    pub modifier: i32,
}

/// Converts an ability score to its modifier: floor((score - 10) / 2).
///
/// Examples: 10 → 0, 14 → +2, 18 → +4, 8 → -1, 7 → -2.
#[must_use]
pub fn ability_modifier(ability_score: i32) -> i32 {
    (ability_score - 10).div_euclid(2)
}

/// Total modifier for a roll: the ability modifier plus every status-effect
/// modifier currently on the character.
#[must_use]
pub fn effective_modifier(
    scores: &AbilityScores,
    ability: Ability,
    status_effects: &[StatusEffect],
) -> i32 {
    let base = ability_modifier(scores.score(ability));
    status_effects.iter().map(|e| e.modifier).sum::<i32>() + base
}
