//! Absorb shields carried by auras

use std::fmt;

use tracing::trace;

use crate::aura::{AuraConfig, AuraLink};
use crate::error::ConfigError;
use crate::sim::Simulation;
use crate::types::{AuraId, ShieldId, SpellId, UnitId};

#[derive(Debug, Clone)]
pub struct ShieldConfig {
    pub aura: AuraConfig,
    pub self_only: bool,
}

impl ShieldConfig {
    pub fn new(aura: AuraConfig) -> Self {
        ShieldConfig {
            aura,
            self_only: false,
        }
    }

    pub fn self_only(mut self) -> Self {
        self.self_only = true;
        self
    }
}

pub struct Shield {
    id: ShieldId,
    aura: AuraId,
    absorb_remaining: f64,
}

impl fmt::Debug for Shield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shield")
            .field("id", &self.id)
            .field("absorb_remaining", &self.absorb_remaining)
            .finish()
    }
}

impl Shield {
    pub fn id(&self) -> ShieldId {
        self.id
    }

    pub fn aura(&self) -> AuraId {
        self.aura
    }

    pub fn absorb_remaining(&self) -> f64 {
        self.absorb_remaining
    }

    pub(crate) fn reset(&mut self) {
        self.absorb_remaining = 0.0;
    }
}

impl Simulation {
    pub(crate) fn create_shields(&mut self, spell: SpellId, config: &ShieldConfig) -> Result<(), ConfigError> {
        for slot in self.sub_effect_slots(spell, config.self_only, false) {
            let owner = Simulation::slot_owner(spell, slot);
            let id = ShieldId { spell, slot };
            let mut aura_config = config.aura.clone();
            aura_config.label = Simulation::sub_effect_label(&config.aura.label, spell, slot);
            let aura = self.register_aura_unchecked(owner, aura_config)?;
            self.aura_mut(aura).link = Some(AuraLink::Shield(id));
            self.units[owner.index()].hooks.shields.push(aura.index);

            self.spell_mut(spell).shields.insert(
                slot,
                Shield {
                    id,
                    aura,
                    absorb_remaining: 0.0,
                },
            );
        }
        Ok(())
    }

    pub fn shield(&self, id: ShieldId) -> Option<&Shield> {
        self.spell(id.spell).shields.get(id.slot)
    }

    fn shield_mut(&mut self, id: ShieldId) -> Option<&mut Shield> {
        self.spell_mut(id.spell).shields.get_mut(id.slot)
    }

    pub fn shield_on(&self, spell: SpellId, target: UnitId) -> Option<ShieldId> {
        self.shield(ShieldId::new(spell, target)).map(Shield::id)
    }

    /// Put up (or replace) a shield absorbing `amount`
    pub fn apply_shield(&mut self, id: ShieldId, amount: f64) {
        let target = Simulation::slot_owner(id.spell, id.slot);
        let Some(shield) = self.shield_mut(id) else {
            return;
        };
        shield.absorb_remaining = amount.max(0.0);
        let aura = shield.aura;
        if let Some(metrics) = self.spell_mut(id.spell).metrics.target_mut(target) {
            metrics.total_shielding += amount.max(0.0);
        }
        self.refresh_aura(aura);
    }

    /// Soak `damage` with the active shields on `target` in registration
    /// order. Returns the absorbed amount.
    pub(crate) fn absorb_damage(&mut self, target: UnitId, damage: f64) -> f64 {
        let mut left = damage;
        let mut i = 0;
        while left > 0.0 && i < self.units[target.index()].hooks.shields.len() {
            let index = self.units[target.index()].hooks.shields[i] as usize;
            i += 1;
            let aura = &self.units[target.index()].auras[index];
            let (Some(AuraLink::Shield(id)), true) = (aura.link, aura.is_active()) else {
                continue;
            };
            let aura_id = aura.id();
            let Some(shield) = self.shield_mut(id) else {
                continue;
            };
            let absorbed = shield.absorb_remaining.min(left);
            shield.absorb_remaining -= absorbed;
            left -= absorbed;
            let depleted = shield.absorb_remaining <= 0.0;
            trace!(sim_time = ?self.current_time, %target, absorbed, "shield absorb");
            if depleted {
                self.deactivate_aura(aura_id);
            }
        }
        damage - left
    }

    pub(crate) fn on_shield_aura_removed(&mut self, id: ShieldId) {
        if let Some(shield) = self.shield_mut(id) {
            shield.absorb_remaining = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConstants;
    use crate::outcome::OutcomeApplier;
    use crate::spell::SpellConfig;
    use crate::types::{ActionId, ProcMask, SpellSchool};
    use crate::unit::UnitConfig;
    use std::time::Duration;

    #[test]
    fn test_shield_absorbs_then_breaks() {
        let mut sim = Simulation::new(EngineConstants::default(), Duration::from_secs(60));
        let priest = sim.add_unit(UnitConfig::player("priest", 60)).unwrap();
        let boss = sim.add_unit(UnitConfig::target("boss", 60)).unwrap();

        let shield_spell = sim
            .register_spell(
                priest,
                SpellConfig {
                    shield: Some(ShieldConfig::new(AuraConfig::new("Barrier", Duration::from_secs(30)))),
                    ..SpellConfig::new(ActionId::spell(17))
                },
            )
            .unwrap();
        let hit = sim
            .register_spell(
                boss,
                SpellConfig::damage(ActionId::spell(99), SpellSchool::PHYSICAL, ProcMask::MELEE_MH_AUTO),
            )
            .unwrap();
        sim.finalize().unwrap();

        let shield = sim.shield_on(shield_spell, priest).unwrap();
        sim.apply_shield(shield, 300.0);
        let aura = sim.shield(shield).unwrap().aura();
        assert!(sim.aura(aura).is_active());

        let first = sim.calc_and_deal_damage(hit, priest, 200.0, OutcomeApplier::AlwaysHit);
        assert!((first.absorbed - 200.0).abs() < 1e-9);
        assert!(sim.unit(priest).damage_taken().abs() < 1e-9);

        let second = sim.calc_and_deal_damage(hit, priest, 250.0, OutcomeApplier::AlwaysHit);
        assert!((second.absorbed - 100.0).abs() < 1e-9);
        assert!((sim.unit(priest).damage_taken() - 150.0).abs() < 1e-9);
        assert!(!sim.aura(aura).is_active());
        assert_eq!(sim.shield(shield).unwrap().absorb_remaining(), 0.0);
        assert!(
            (sim.spell_metrics(shield_spell, priest).unwrap().total_shielding - 300.0).abs() < 1e-9
        );
    }
}
