//! Core identifiers, schools, masks and flags shared by every engine module

use std::fmt;
use std::time::Duration;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Duration value meaning "never expires"
pub const NEVER_EXPIRES: Duration = Duration::MAX;

/// Duration from fractional seconds; negative values clamp to zero
pub fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

/// Index of a unit inside the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl UnitId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Handle to a spell in a unit's spellbook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpellId {
    pub unit: UnitId,
    pub index: u32,
}

/// Handle to an aura registered on a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AuraId {
    pub unit: UnitId,
    pub index: u32,
}

/// Handle to a shareable ready-at timer owned by a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId {
    pub unit: UnitId,
    pub index: u32,
}

/// Which copy of a per-target sub-effect a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectSlot {
    /// The copy carried by the given unit
    Target(UnitId),
    /// The single area-of-effect copy, carried by the caster
    Aoe,
}

/// Handle to the dot or hot of a spell on one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DotId {
    pub spell: SpellId,
    pub slot: EffectSlot,
}

impl DotId {
    pub fn new(spell: SpellId, target: UnitId) -> Self {
        DotId {
            spell,
            slot: EffectSlot::Target(target),
        }
    }

    pub fn aoe(spell: SpellId) -> Self {
        DotId {
            spell,
            slot: EffectSlot::Aoe,
        }
    }
}

/// Handle to the absorb shield of a spell on one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShieldId {
    pub spell: SpellId,
    pub slot: EffectSlot,
}

impl ShieldId {
    pub fn new(spell: SpellId, target: UnitId) -> Self {
        ShieldId {
            spell,
            slot: EffectSlot::Target(target),
        }
    }
}

/// What kind of game object an action id points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Spell(i32),
    Item(i32),
    Other(i32),
}

impl Default for ActionKind {
    fn default() -> Self {
        ActionKind::Other(0)
    }
}

/// Identity of an action: the underlying game id plus a tag that separates
/// variants of the same action (ranks of a proc, metric splits, ...)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ActionId {
    pub kind: ActionKind,
    #[serde(default)]
    pub tag: i32,
}

impl ActionId {
    pub const fn spell(id: i32) -> Self {
        ActionId {
            kind: ActionKind::Spell(id),
            tag: 0,
        }
    }

    pub const fn item(id: i32) -> Self {
        ActionId {
            kind: ActionKind::Item(id),
            tag: 0,
        }
    }

    pub const fn other(id: i32) -> Self {
        ActionId {
            kind: ActionKind::Other(id),
            tag: 0,
        }
    }

    pub const fn with_tag(self, tag: i32) -> Self {
        ActionId {
            kind: self.kind,
            tag,
        }
    }

    /// True when both ids name the same action, ignoring the tag
    pub fn same_action(&self, other: ActionId) -> bool {
        self.kind == other.kind
    }

    /// Spell id, if this action is a spell
    pub fn spell_id(&self) -> Option<i32> {
        match self.kind {
            ActionKind::Spell(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ActionKind::Spell(id) => write!(f, "spell:{id}")?,
            ActionKind::Item(id) => write!(f, "item:{id}")?,
            ActionKind::Other(id) => write!(f, "other:{id}")?,
        }
        if self.tag != 0 {
            write!(f, "/{}", self.tag)?;
        }
        Ok(())
    }
}

bitflags! {
    /// Magic school(s) of a spell. Multi-school spells set several bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct SpellSchool: u8 {
        const PHYSICAL = 1 << 0;
        const ARCANE   = 1 << 1;
        const FIRE     = 1 << 2;
        const FROST    = 1 << 3;
        const HOLY     = 1 << 4;
        const NATURE   = 1 << 5;
        const SHADOW   = 1 << 6;
    }
}

impl SpellSchool {
    pub fn matches(self, other: SpellSchool) -> bool {
        self.intersects(other)
    }

    /// Single schools contained in this mask, in declaration order
    pub fn base_schools(self) -> impl Iterator<Item = SchoolIndex> {
        SchoolIndex::ALL
            .into_iter()
            .filter(move |s| self.contains(s.school()))
    }
}

/// Dense index of a single school, used for per-school arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchoolIndex {
    Physical,
    Arcane,
    Fire,
    Frost,
    Holy,
    Nature,
    Shadow,
}

impl SchoolIndex {
    pub const COUNT: usize = 7;
    pub const ALL: [SchoolIndex; SchoolIndex::COUNT] = [
        SchoolIndex::Physical,
        SchoolIndex::Arcane,
        SchoolIndex::Fire,
        SchoolIndex::Frost,
        SchoolIndex::Holy,
        SchoolIndex::Nature,
        SchoolIndex::Shadow,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn school(self) -> SpellSchool {
        SpellSchool::from_bits_truncate(1 << (self as u8))
    }
}

bitflags! {
    /// Classifies how a spell was triggered, for proc conditions.
    /// The empty mask is "unknown" and is rejected for damaging spells.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ProcMask: u32 {
        const EMPTY            = 1 << 0;
        const MELEE_MH_AUTO    = 1 << 1;
        const MELEE_OH_AUTO    = 1 << 2;
        const MELEE_MH_SPECIAL = 1 << 3;
        const MELEE_OH_SPECIAL = 1 << 4;
        const RANGED_AUTO      = 1 << 5;
        const RANGED_SPECIAL   = 1 << 6;
        const SPELL_DAMAGE     = 1 << 7;
        const SPELL_HEALING    = 1 << 8;
        const SPELL_PROC       = 1 << 9;
        const MELEE_PROC       = 1 << 10;
        const WEAPON_PROC      = 1 << 11;

        const MELEE_WHITE_HIT = Self::MELEE_MH_AUTO.bits() | Self::MELEE_OH_AUTO.bits();
        const MELEE_SPECIAL   = Self::MELEE_MH_SPECIAL.bits() | Self::MELEE_OH_SPECIAL.bits();
        const MELEE           = Self::MELEE_WHITE_HIT.bits() | Self::MELEE_SPECIAL.bits() | Self::MELEE_PROC.bits();
        const RANGED          = Self::RANGED_AUTO.bits() | Self::RANGED_SPECIAL.bits();
        const SPELL           = Self::SPELL_DAMAGE.bits() | Self::SPELL_HEALING.bits() | Self::SPELL_PROC.bits();
    }
}

impl ProcMask {
    pub const UNKNOWN: ProcMask = ProcMask::empty();

    pub fn matches(self, other: ProcMask) -> bool {
        self.intersects(other)
    }
}

bitflags! {
    /// Behaviour switches for a spell
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct SpellFlags: u32 {
        const IGNORE_RESISTS             = 1 << 0;
        const IGNORE_ARMOR               = 1 << 1;
        /// Fully resisted or not at all; no partial resist roll
        const BINARY                     = 1 << 2;
        const NO_METRICS                 = 1 << 3;
        const NO_LOGS                    = 1 << 4;
        const HELPFUL                    = 1 << 5;
        const CHANNELED                  = 1 << 6;
        const PURE_DOT                   = 1 << 7;
        /// Completing this cast does not fire on-cast-complete hooks
        const NO_ON_CAST_COMPLETE        = 1 << 8;
        const IGNORE_ATTACKER_MODIFIERS  = 1 << 9;
        const IGNORE_TARGET_MODIFIERS    = 1 << 10;
    }
}

/// Which attack table a spell rolls against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefenseType {
    #[default]
    None,
    Magic,
    Melee,
    Ranged,
}

/// Kind of actor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    #[default]
    Player,
    Pet,
    Npc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_converts_fractions_and_clamps_negative() {
        assert_eq!(secs(1.5), Duration::from_millis(1500));
        assert_eq!(secs(-2.0), Duration::ZERO);
    }

    #[test]
    fn test_action_id_tag_is_ignored_by_same_action() {
        let base = ActionId::spell(10);
        let tagged = base.with_tag(3);
        assert!(base.same_action(tagged));
        assert_ne!(base, tagged);
        assert!(!base.same_action(ActionId::item(10)));
    }

    #[test]
    fn test_action_id_display() {
        assert_eq!(ActionId::spell(133).to_string(), "spell:133");
        assert_eq!(ActionId::item(5).with_tag(2).to_string(), "item:5/2");
    }

    #[test]
    fn test_base_schools_of_multi_school() {
        let school = SpellSchool::FIRE | SpellSchool::FROST;
        let bases: Vec<_> = school.base_schools().collect();
        assert_eq!(bases, vec![SchoolIndex::Fire, SchoolIndex::Frost]);
        assert!(school.matches(SpellSchool::FROST));
        assert!(!school.matches(SpellSchool::PHYSICAL));
    }

    #[test]
    fn test_school_index_round_trip() {
        for s in SchoolIndex::ALL {
            assert_eq!(s.school().base_schools().next(), Some(s));
        }
    }

    #[test]
    fn test_proc_mask_composites() {
        assert!(ProcMask::MELEE.contains(ProcMask::MELEE_MH_AUTO));
        assert!(ProcMask::SPELL.matches(ProcMask::SPELL_DAMAGE));
        assert!(!ProcMask::RANGED.matches(ProcMask::MELEE));
        assert!(ProcMask::UNKNOWN.is_empty());
    }
}
