pub mod budget;
pub mod quality_gate;
pub mod scoring;
pub mod signal_builder;
pub mod win_probability;

pub use budget::{BudgetStatus, PublicationBudget};
pub use quality_gate::{Candidate, GateDecision, QualityGate};
pub use win_probability::{LogisticWinModel, WinProbabilityModel};
