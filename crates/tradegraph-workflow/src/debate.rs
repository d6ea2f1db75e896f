//! Round-bounded debate controller
//!
//! A debate is a fixed rotation of speakers closed by a judge. The position
//! in the rotation is derived from the round counter alone:
//!
//! ```text
//! effective = round mod (len * max_rounds)
//! position  = effective mod len
//! position < len - 1  => speaker[position]
//! otherwise           => judge
//! ```
//!
//! With the canonical 3-role rotation and `max_rounds = 2` the sequence is
//! `bull, bear, judge, bull, bear, judge`, after which the debate's budget of
//! `len * max_rounds` invocations is exhausted.

use crate::{Result, WorkflowError};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use tradegraph_core::{DebateKind, Stage};

/// Positional role within a rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Participant {
    First,
    Second,
    Third,
    Judge,
}

impl Participant {
    fn speaker(position: usize) -> Self {
        match position {
            0 => Self::First,
            1 => Self::Second,
            _ => Self::Third,
        }
    }
}

/// Where a round counter points within a rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateRound {
    pub round_number: u32,
    pub participant: Participant,
}

/// Outcome of asking who speaks next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// A speaker argues
    Speaker(Stage),
    /// The judge closes the cycle
    Judge(Stage),
}

impl Turn {
    /// The stage to dispatch to
    pub fn stage(self) -> Stage {
        match self {
            Self::Speaker(stage) | Self::Judge(stage) => stage,
        }
    }
}

/// A fixed ordered list of debate speakers followed by a judge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    speakers: Vec<Stage>,
    judge: Stage,
}

impl Rotation {
    /// Create a rotation
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless there are one to three speakers,
    /// every speaker and the judge belong to the same debate, and no speaker
    /// repeats.
    pub fn new(speakers: Vec<Stage>, judge: Stage) -> Result<Self> {
        let Some(debate) = judge.debate().filter(|_| judge.is_judge()) else {
            return Err(WorkflowError::Configuration(format!(
                "{judge} cannot judge a debate"
            )));
        };

        if speakers.is_empty() || speakers.len() > 3 {
            return Err(WorkflowError::Configuration(format!(
                "a rotation needs 1 to 3 speakers, got {}",
                speakers.len()
            )));
        }

        for (i, speaker) in speakers.iter().enumerate() {
            if !speaker.is_debate_speaker() || speaker.debate() != Some(debate) {
                return Err(WorkflowError::Configuration(format!(
                    "{speaker} cannot speak in the {debate} debate"
                )));
            }
            if speakers[..i].contains(speaker) {
                return Err(WorkflowError::Configuration(format!(
                    "{speaker} appears twice in the rotation"
                )));
            }
        }

        Ok(Self { speakers, judge })
    }

    /// Bull, bear, research manager
    pub fn investment() -> Self {
        Self {
            speakers: vec![Stage::Bull, Stage::Bear],
            judge: Stage::ResearchManager,
        }
    }

    /// Aggressive, conservative, risk judge
    pub fn risk() -> Self {
        Self {
            speakers: vec![Stage::Aggressive, Stage::Conservative],
            judge: Stage::RiskJudge,
        }
    }

    /// Aggressive, conservative, neutral, risk judge
    pub fn risk_with_neutral() -> Self {
        Self {
            speakers: vec![Stage::Aggressive, Stage::Conservative, Stage::Neutral],
            judge: Stage::RiskJudge,
        }
    }

    /// Number of roles including the judge
    pub fn len(&self) -> usize {
        self.speakers.len() + 1
    }

    pub fn speakers(&self) -> &[Stage] {
        &self.speakers
    }

    pub fn judge(&self) -> Stage {
        self.judge
    }

    /// The debate this rotation runs
    pub fn debate(&self) -> DebateKind {
        match self.judge {
            Stage::ResearchManager => DebateKind::Investment,
            _ => DebateKind::Risk,
        }
    }

    /// Every stage of the rotation, speakers first
    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.speakers.iter().copied().chain(std::iter::once(self.judge))
    }

    /// Total invocations a debate may consume
    pub fn budget(&self, max_rounds: NonZeroU32) -> u64 {
        self.len() as u64 * u64::from(max_rounds.get())
    }

    /// Whether a round counter has used up the budget
    pub fn is_exhausted(&self, round_number: u32, max_rounds: NonZeroU32) -> bool {
        u64::from(round_number) >= self.budget(max_rounds)
    }

    /// Position of a round counter within the rotation
    pub fn round(&self, round_number: u32, max_rounds: NonZeroU32) -> DebateRound {
        let len = self.len() as u64;
        let effective = u64::from(round_number) % self.budget(max_rounds);
        let position = (effective % len) as usize;

        let participant = if position < self.speakers.len() {
            Participant::speaker(position)
        } else {
            Participant::Judge
        };

        DebateRound {
            round_number,
            participant,
        }
    }

    /// Who acts at a given round
    pub fn next_participant(&self, round_number: u32, max_rounds: NonZeroU32) -> Turn {
        let round = self.round(round_number, max_rounds);
        self.turn_for(round.participant)
    }

    /// The stage filling a positional role
    pub fn turn_for(&self, participant: Participant) -> Turn {
        let position = match participant {
            Participant::First => 0,
            Participant::Second => 1,
            Participant::Third => 2,
            Participant::Judge => return Turn::Judge(self.judge),
        };

        match self.speakers.get(position) {
            Some(stage) => Turn::Speaker(*stage),
            None => Turn::Judge(self.judge),
        }
    }
}

/// Free-function form of [`Rotation::next_participant`]
pub fn next_participant(round_number: u32, max_rounds: NonZeroU32, rotation: &Rotation) -> Turn {
    rotation.next_participant(round_number, max_rounds)
}
