// 🗳️ Vote Input - validated scores before they reach the store
//
// The store trusts whatever VoteScore it is handed. Every path that turns
// outside input into a vote (terminal modal, CLI, HTTP body) goes through here.

use thiserror::Error;

/// Longest text the vote modal accepts, e.g. "100.00".
pub const MAX_DRAFT_LEN: usize = 6;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidVote {
    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("score {0} is outside 0.0 - 1.0")]
    OutOfRange(f64),
}

// ============================================================================
// VOTE SCORE
// ============================================================================

/// A vote as a fraction in [0, 1]. 0 is the top pole, 1 the bottom pole.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteScore(f64);

impl VoteScore {
    /// Accept a raw fraction. Nothing is clamped here: an API client sending
    /// 1.3 gets an error, not a silently different vote.
    pub fn new(value: f64) -> Result<Self, InvalidVote> {
        if !value.is_finite() {
            return Err(InvalidVote::NotANumber(value.to_string()));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(InvalidVote::OutOfRange(value));
        }
        Ok(VoteScore(value))
    }

    /// Parse a 0-100 percentage typed by a person.
    /// Non-numeric input is rejected, numeric input is clamped to 0-100.
    pub fn from_percent_input(input: &str) -> Result<Self, InvalidVote> {
        let trimmed = input.trim().trim_end_matches('%').trim();
        let percent: f64 = trimmed
            .parse()
            .map_err(|_| InvalidVote::NotANumber(input.to_string()))?;

        if !percent.is_finite() {
            return Err(InvalidVote::NotANumber(input.to_string()));
        }

        Ok(VoteScore(percent.clamp(0.0, 100.0) / 100.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn as_percent(&self) -> f64 {
        self.0 * 100.0
    }
}

// ============================================================================
// VOTE DRAFT (modal input buffer)
// ============================================================================

/// Text being typed into the vote modal for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteDraft {
    pub entity_id: String,
    pub input: String,
    pub error: Option<String>,
}

impl VoteDraft {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            input: String::new(),
            error: None,
        }
    }

    /// Append a typed character. Only digits and a single decimal point get in.
    pub fn push(&mut self, c: char) -> bool {
        if self.input.len() >= MAX_DRAFT_LEN {
            return false;
        }
        let accepted = c.is_ascii_digit() || (c == '.' && !self.input.contains('.'));
        if accepted {
            self.input.push(c);
            self.error = None;
        }
        accepted
    }

    pub fn backspace(&mut self) {
        self.input.pop();
        self.error = None;
    }

    /// Parse the buffer. On failure the message is kept for the modal to show.
    pub fn submit(&mut self) -> Result<VoteScore, InvalidVote> {
        match VoteScore::from_percent_input(&self.input) {
            Ok(score) => Ok(score),
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }
}
