// Technician selection
//
// Scores every non-offline technician and picks the highest. Ties keep the
// earliest candidate in pool order.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::fault::normalize_fault_type;
use crate::technician::{Technician, TechnicianStatus};

const AVAILABLE_BONUS: f64 = 40.0;
const BUSY_BONUS: f64 = 15.0;
const SKILL_BONUS: f64 = 30.0;
const LIGHT_LOAD_BONUS: f64 = 25.0;
const MODERATE_LOAD_BONUS: f64 = 10.0;
const HEAVY_LOAD_PENALTY: f64 = -15.0;
const SPEED_BONUS_MAX: f64 = 20.0;
const SPEED_PENALTY_PER_HOUR: f64 = 3.0;

/// Skills that qualify a technician for any fault type
const GENERIC_SKILLS: &[&str] = &["diagnostic", "maintenance"];

/// A candidate with its selection score
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ScoredTechnician {
    pub technician: Technician,
    pub score: f64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TechnicianSelector;

impl TechnicianSelector {
    pub fn new() -> Self {
        Self
    }

    /// Score a technician for a fault type; None if not eligible
    pub fn score(&self, technician: &Technician, fault_type: &str) -> Option<f64> {
        let mut score = match technician.status {
            TechnicianStatus::Available => AVAILABLE_BONUS,
            TechnicianStatus::Busy => BUSY_BONUS,
            TechnicianStatus::Offline => return None,
        };

        if has_matching_skill(&technician.skills, fault_type) {
            score += SKILL_BONUS;
        }

        score += match technician.active_tickets {
            0..=1 => LIGHT_LOAD_BONUS,
            2..=3 => MODERATE_LOAD_BONUS,
            _ => HEAVY_LOAD_PENALTY,
        };

        score += (SPEED_BONUS_MAX - SPEED_PENALTY_PER_HOUR * technician.avg_resolution_time)
            .max(0.0);

        Some(score)
    }

    /// Best candidate in `pool`, or None if nobody is eligible
    pub fn select(&self, pool: &[Technician], fault_type: &str) -> Option<ScoredTechnician> {
        let mut best: Option<ScoredTechnician> = None;
        for technician in pool {
            let Some(score) = self.score(technician, fault_type) else {
                continue;
            };
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(ScoredTechnician {
                    technician: technician.clone(),
                    score,
                });
            }
        }
        best
    }
}

fn has_matching_skill(skills: &[String], fault_type: &str) -> bool {
    let fault = normalize_fault_type(fault_type);
    skills.iter().any(|skill| {
        let skill = normalize_fault_type(skill);
        if skill.is_empty() {
            return false;
        }
        if GENERIC_SKILLS.iter().any(|g| skill.contains(g)) {
            return true;
        }
        !fault.is_empty() && (fault.contains(&skill) || skill.contains(&fault))
    })
}
