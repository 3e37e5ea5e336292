use crate::domain::recommendation::{ProtocolStep, Recommendation};
use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Recommendation as emitted by the model, before structural validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRecommendation {
    pub protocol_name: String,
    pub protocol_description: String,
    pub protocol_steps: Vec<LlmProtocolStep>,
    pub protocol_link: String,
    pub estimated_slippage: String,
    pub overall_benefit: String,
    pub risks: Vec<String>,
    pub alternative_protocols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProtocolStep {
    pub step_number: i64,
    pub description: String,
    pub estimated_time: String,
    pub potential_fees: String,
}

impl LlmRecommendation {
    pub fn validate_and_into_recommendation(self) -> anyhow::Result<Recommendation> {
        let protocol_name = self.protocol_name.trim().to_string();
        ensure!(!protocol_name.is_empty(), "protocol_name must be non-empty");

        let protocol_description = self.protocol_description.trim().to_string();
        ensure!(
            !protocol_description.is_empty(),
            "protocol_description must be non-empty"
        );

        ensure!(
            !self.protocol_steps.is_empty(),
            "protocol_steps must contain at least one step"
        );

        let step_count = self.protocol_steps.len() as i64;
        let mut seen = BTreeSet::<i64>::new();
        let mut protocol_steps = Vec::with_capacity(self.protocol_steps.len());
        for step in self.protocol_steps {
            protocol_steps.push(step.validate_and_into_step(step_count, &mut seen)?);
        }

        // Step numbers must cover 1..=n exactly.
        for n in 1..=step_count {
            if !seen.contains(&n) {
                bail!("missing step_number {n} in protocol_steps");
            }
        }
        protocol_steps.sort_by_key(|s| s.step_number);

        Ok(Recommendation {
            protocol_name,
            protocol_description,
            protocol_steps,
            protocol_link: self.protocol_link.trim().to_string(),
            estimated_slippage: self.estimated_slippage.trim().to_string(),
            overall_benefit: self.overall_benefit.trim().to_string(),
            risks: non_empty_lines(self.risks),
            alternative_protocols: non_empty_lines(self.alternative_protocols),
        })
    }
}

impl LlmProtocolStep {
    fn validate_and_into_step(
        self,
        step_count: i64,
        seen: &mut BTreeSet<i64>,
    ) -> anyhow::Result<ProtocolStep> {
        ensure!(
            (1..=step_count).contains(&self.step_number),
            "step_number out of range: {} (expected 1..={step_count})",
            self.step_number
        );
        ensure!(
            seen.insert(self.step_number),
            "duplicate step_number: {}",
            self.step_number
        );

        let description = self.description.trim().to_string();
        ensure!(
            !description.is_empty(),
            "step {} description must be non-empty",
            self.step_number
        );

        Ok(ProtocolStep {
            step_number: self.step_number as u32,
            description,
            estimated_time: self.estimated_time.trim().to_string(),
            potential_fees: self.potential_fees.trim().to_string(),
        })
    }
}

fn non_empty_lines(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
