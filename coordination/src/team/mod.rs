//! Team assembly: composition, candidate scoring, selection

pub mod composer;
pub mod lexicon;
pub mod selector;

pub use composer::{ComplexityLevel, TeamComposer, TeamComposition};
pub use lexicon::{Lexicon, SynergyTable};
pub use selector::{AgentSelector, CandidateScore, ScoreBreakdown};
