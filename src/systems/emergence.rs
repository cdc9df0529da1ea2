/// Emergence scan: crisis detection over aggregate state
///
/// A periodic sweep of population, needs and recent violence that raises
/// crisis events and keeps the legends list current. Shape only; the
/// narrative interpretation of these signals lives outside the kernel.
use bevy::prelude::*;
use serde_json::json;
use std::collections::HashMap;

use crate::errors::SystemResult;
use crate::events::EventName;
use crate::world::state::{CombatLogEntry, Legend};
use crate::world::types::EntityId;

use super::{needs, SimContext, Subsystem};

const SCAN_CADENCE: f64 = 10.0;
/// Fraction of the population critically hungry that marks a starvation wave
const STARVATION_WAVE_FRACTION: f32 = 0.3;
/// Kills inside the window that mark a violence wave
const VIOLENCE_WAVE_KILLS: usize = 3;
const VIOLENCE_WINDOW_SECS: f64 = 60.0;
/// Kills that make an agent a legend
const LEGEND_KILLS: usize = 3;

#[derive(Debug, Default)]
pub struct EmergenceSystem {
    last_scan: f64,
    starvation_active: bool,
    violence_active: bool,
}

impl EmergenceSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn scan(&mut self, ctx: &mut SimContext<'_>) {
        let now = ctx.now();
        let population = ctx.state.population();
        if population == 0 {
            return;
        }

        // Starvation wave: a meaningful share of the settlement critically
        // hungry
        let hungry = ctx
            .state
            .alive_agents()
            .filter(|a| {
                ctx.state
                    .needs
                    .get(&a.id)
                    .map(|n| n.hunger < needs::critical_threshold(crate::world::types::NeedKind::Hunger))
                    .unwrap_or(false)
            })
            .count();
        let hungry_fraction = hungry as f32 / population as f32;
        if hungry_fraction >= STARVATION_WAVE_FRACTION {
            if !self.starvation_active {
                self.starvation_active = true;
                warn!("🚨 Starvation wave: {}/{} agents critical", hungry, population);
                ctx.bus.emit(
                    EventName::CrisisWarning,
                    json!({
                        "kind": "starvation_wave",
                        "affected": hungry,
                        "population": population,
                    }),
                );
            }
        } else {
            self.starvation_active = false;
            // Trending toward a wave is worth a prediction
            if hungry_fraction >= STARVATION_WAVE_FRACTION / 2.0 {
                ctx.bus.emit(
                    EventName::CrisisPrediction,
                    json!({ "kind": "starvation_wave", "affected": hungry }),
                );
            }
        }

        // Violence wave: recent kills in the log window
        let mut kills_by_agent: HashMap<EntityId, usize> = HashMap::new();
        let mut recent_kills = 0usize;
        for entry in ctx.state.combat_log.iter() {
            if let CombatLogEntry::Kill { attacker, at, .. } = entry {
                *kills_by_agent.entry(attacker.clone()).or_insert(0) += 1;
                if now - at <= VIOLENCE_WINDOW_SECS {
                    recent_kills += 1;
                }
            }
        }
        if recent_kills >= VIOLENCE_WAVE_KILLS {
            if !self.violence_active {
                self.violence_active = true;
                ctx.bus.emit(
                    EventName::CrisisWarning,
                    json!({ "kind": "violence_wave", "kills": recent_kills }),
                );
            }
        } else {
            self.violence_active = false;
        }

        // Legends: prolific killers get remembered
        for (agent_id, kills) in kills_by_agent {
            if kills < LEGEND_KILLS {
                continue;
            }
            let known = ctx
                .state
                .legends
                .iter()
                .any(|l| l.subject == agent_id && l.active);
            if !known && ctx.state.agents.contains_key(&agent_id) {
                ctx.state.legends.push(Legend {
                    title: "dread warrior".to_string(),
                    subject: agent_id,
                    started_at: now,
                    active: true,
                });
            }
        }
    }
}

impl Subsystem for EmergenceSystem {
    fn update(&mut self, ctx: &mut SimContext<'_>, _dt: f32) -> SystemResult {
        let now = ctx.now();
        let forced = std::mem::take(&mut ctx.state.force_emergence_scan);
        if !forced && now - self.last_scan < SCAN_CADENCE {
            return Ok(());
        }
        self.last_scan = now;
        self.scan(ctx);
        Ok(())
    }
}
