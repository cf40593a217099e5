//! Static class/spec data and skill-based spec inference.
//!
//! The wire never announces a player's spec directly; it is inferred
//! from the skill ids they have been observed using. Each spec owns a
//! small, disjoint set of signature skills.

use hashbrown::HashSet;
use phf::phf_map;

/// Playable classes with their wire ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    Stormblade,
    FrostMage,
    WindKnight,
    VerdantOracle,
    HeavyGuardian,
    Marksman,
    ShieldKnight,
    BeatPerformer,
}

impl Class {
    pub fn id(self) -> u32 {
        match self {
            Self::Stormblade => 1,
            Self::FrostMage => 2,
            Self::WindKnight => 4,
            Self::VerdantOracle => 5,
            Self::HeavyGuardian => 9,
            Self::Marksman => 11,
            Self::ShieldKnight => 12,
            Self::BeatPerformer => 13,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::Stormblade),
            2 => Some(Self::FrostMage),
            4 => Some(Self::WindKnight),
            5 => Some(Self::VerdantOracle),
            9 => Some(Self::HeavyGuardian),
            11 => Some(Self::Marksman),
            12 => Some(Self::ShieldKnight),
            13 => Some(Self::BeatPerformer),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Stormblade => "Stormblade",
            Self::FrostMage => "Frost Mage",
            Self::WindKnight => "Wind Knight",
            Self::VerdantOracle => "Verdant Oracle",
            Self::HeavyGuardian => "Heavy Guardian",
            Self::Marksman => "Marksman",
            Self::ShieldKnight => "Shield Knight",
            Self::BeatPerformer => "Beat Performer",
        }
    }
}

/// Sub-specializations, one of two per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spec {
    Iaido,
    Moonstrike,
    Icicle,
    Frostbeam,
    Vanguard,
    Skyward,
    Smite,
    Lifebind,
    Earthfort,
    Block,
    Falconry,
    Wildpack,
    Recovery,
    Shield,
    Dissonance,
    Concerto,
}

impl Spec {
    pub fn name(self) -> &'static str {
        match self {
            Self::Iaido => "Iaido",
            Self::Moonstrike => "Moonstrike",
            Self::Icicle => "Icicle",
            Self::Frostbeam => "Frostbeam",
            Self::Vanguard => "Vanguard",
            Self::Skyward => "Skyward",
            Self::Smite => "Smite",
            Self::Lifebind => "Lifebind",
            Self::Earthfort => "Earthfort",
            Self::Block => "Block",
            Self::Falconry => "Falconry",
            Self::Wildpack => "Wildpack",
            Self::Recovery => "Recovery",
            Self::Shield => "Shield",
            Self::Dissonance => "Dissonance",
            Self::Concerto => "Concerto",
        }
    }

    pub fn class(self) -> Class {
        match self {
            Self::Iaido | Self::Moonstrike => Class::Stormblade,
            Self::Icicle | Self::Frostbeam => Class::FrostMage,
            Self::Vanguard | Self::Skyward => Class::WindKnight,
            Self::Smite | Self::Lifebind => Class::VerdantOracle,
            Self::Earthfort | Self::Block => Class::HeavyGuardian,
            Self::Falconry | Self::Wildpack => Class::Marksman,
            Self::Recovery | Self::Shield => Class::ShieldKnight,
            Self::Dissonance | Self::Concerto => Class::BeatPerformer,
        }
    }

    /// Stable internal id (detection-table order, 1-based). Nothing on
    /// the wire carries spec ids; this is ours.
    pub fn id(self) -> u32 {
        self as u32 + 1
    }
}

/// Signature-skill sets per spec, in detection priority order.
const SPEC_RULES: &[(Spec, &[u32])] = &[
    (Spec::Iaido, &[1714, 1734]),
    (Spec::Moonstrike, &[44701, 179906]),
    (Spec::Icicle, &[120901, 120902]),
    (Spec::Frostbeam, &[1241]),
    (Spec::Vanguard, &[1405, 1418]),
    (Spec::Skyward, &[1419]),
    (Spec::Smite, &[1518, 1541, 21402]),
    (Spec::Lifebind, &[20301]),
    (Spec::Earthfort, &[199902]),
    (Spec::Block, &[1930, 1931, 1934, 1935]),
    (Spec::Falconry, &[220112, 2203622]),
    (Spec::Wildpack, &[2292, 1700820, 1700825, 1700827]),
    (Spec::Recovery, &[2405]),
    (Spec::Shield, &[2406]),
    (Spec::Dissonance, &[2306]),
    (Spec::Concerto, &[2307, 2361, 55302]),
];

/// Fast membership probe used as a pre-check before running the
/// ordered table scan on every new skill.
static SPEC_BY_SKILL: phf::Map<u32, Spec> = phf_map! {
    1714u32 => Spec::Iaido,
    1734u32 => Spec::Iaido,
    44701u32 => Spec::Moonstrike,
    179906u32 => Spec::Moonstrike,
    120901u32 => Spec::Icicle,
    120902u32 => Spec::Icicle,
    1241u32 => Spec::Frostbeam,
    1405u32 => Spec::Vanguard,
    1418u32 => Spec::Vanguard,
    1419u32 => Spec::Skyward,
    1518u32 => Spec::Smite,
    1541u32 => Spec::Smite,
    21402u32 => Spec::Smite,
    20301u32 => Spec::Lifebind,
    199902u32 => Spec::Earthfort,
    1930u32 => Spec::Block,
    1931u32 => Spec::Block,
    1934u32 => Spec::Block,
    1935u32 => Spec::Block,
    220112u32 => Spec::Falconry,
    2203622u32 => Spec::Falconry,
    2292u32 => Spec::Wildpack,
    1700820u32 => Spec::Wildpack,
    1700825u32 => Spec::Wildpack,
    1700827u32 => Spec::Wildpack,
    2405u32 => Spec::Recovery,
    2406u32 => Spec::Shield,
    2306u32 => Spec::Dissonance,
    2307u32 => Spec::Concerto,
    2361u32 => Spec::Concerto,
    55302u32 => Spec::Concerto,
};

/// The spec a single skill belongs to, if any.
pub fn spec_for_skill(skill_id: u32) -> Option<Spec> {
    SPEC_BY_SKILL.get(&skill_id).copied()
}

/// Infer a spec from the full set of observed skill ids. First match in
/// table order wins when a set somehow straddles two specs.
pub fn detect_spec(observed: &HashSet<u32>) -> Option<Spec> {
    for (spec, skills) in SPEC_RULES {
        if skills.iter().any(|id| observed.contains(id)) {
            return Some(*spec);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_rule_skill_is_in_the_probe_map() {
        for (spec, skills) in SPEC_RULES {
            for id in *skills {
                assert_eq!(spec_for_skill(*id), Some(*spec), "skill {id}");
            }
        }
    }

    #[test]
    fn detects_specs_and_classes() {
        let observed: HashSet<u32> = [999u32, 1714].into_iter().collect();
        let spec = detect_spec(&observed).unwrap();
        assert_eq!(spec, Spec::Iaido);
        assert_eq!(spec.name(), "Iaido");
        assert_eq!(spec.class().id(), 1);

        let observed: HashSet<u32> = [2307u32].into_iter().collect();
        assert_eq!(detect_spec(&observed), Some(Spec::Concerto));
        assert_eq!(Spec::Concerto.class().id(), 13);
    }

    #[test]
    fn table_order_breaks_ties() {
        // A set containing skills from both Stormblade specs resolves
        // to the earlier table entry.
        let observed: HashSet<u32> = [44701u32, 1714].into_iter().collect();
        assert_eq!(detect_spec(&observed), Some(Spec::Iaido));
    }

    #[test]
    fn unknown_skills_detect_nothing() {
        let observed: HashSet<u32> = [1u32, 2, 3].into_iter().collect();
        assert_eq!(detect_spec(&observed), None);
        assert_eq!(spec_for_skill(424242), None);
    }
}
