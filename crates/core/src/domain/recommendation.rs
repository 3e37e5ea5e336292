use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub protocol_name: String,
    pub protocol_description: String,
    pub protocol_steps: Vec<ProtocolStep>,
    pub protocol_link: String,
    pub estimated_slippage: String,
    pub overall_benefit: String,
    pub risks: Vec<String>,
    pub alternative_protocols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolStep {
    pub step_number: u32,
    pub description: String,
    pub estimated_time: String,
    pub potential_fees: String,
}
