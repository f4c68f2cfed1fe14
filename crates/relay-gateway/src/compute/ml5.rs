//! `ml5` role: lexicon sentiment classifier.
//!
//! Small, deterministic stand-in for model inference. Each word found in
//! the lexicon votes for its polarity; the score is the vote balance in
//! `[-1, 1]`.

use crate::domain::envelope::Envelope;
use crate::domain::error::ComputeError;
use crate::ports::outbound::Compute;
use async_trait::async_trait;
use serde::Serialize;

const POSITIVE: &[&str] = &[
    "good", "great", "excellent", "happy", "love", "like", "nice", "fast", "awesome", "best",
    "fine", "wonderful", "amazing", "cool", "fun", "win", "success", "stable",
];

const NEGATIVE: &[&str] = &[
    "bad", "terrible", "awful", "sad", "hate", "dislike", "slow", "worst", "broken", "fail",
    "error", "crash", "bug", "angry", "poor", "lose", "timeout", "down",
];

/// Words that flip the polarity of the next lexicon hit.
const NEGATORS: &[&str] = &["not", "no", "never", "dont", "isnt", "wasnt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: Label,
    pub score: f64,
    pub tokens: usize,
}

pub struct Ml5Compute;

#[async_trait]
impl Compute for Ml5Compute {
    fn name(&self) -> &'static str {
        "ml5"
    }

    async fn compute(&self, request: &Envelope) -> Result<String, ComputeError> {
        let result = classify(&request.payload)?;
        serde_json::to_string(&result).map_err(|e| ComputeError::InvalidInput(e.to_string()))
    }
}

pub fn classify(text: &str) -> Result<Classification, ComputeError> {
    let words = tokenize(text);
    if words.is_empty() {
        return Err(ComputeError::InvalidInput("no words to classify".into()));
    }

    let (mut positive, mut negative) = (0i64, 0i64);
    let mut negate = false;
    for word in &words {
        if NEGATORS.contains(&word.as_str()) {
            negate = true;
            continue;
        }
        let polarity = if POSITIVE.contains(&word.as_str()) {
            1
        } else if NEGATIVE.contains(&word.as_str()) {
            -1
        } else {
            continue;
        };
        let polarity = if negate { -polarity } else { polarity };
        negate = false;

        if polarity > 0 {
            positive += 1;
        } else {
            negative += 1;
        }
    }

    let hits = positive + negative;
    let score = if hits == 0 {
        0.0
    } else {
        (positive - negative) as f64 / hits as f64
    };
    let label = if score > 0.0 {
        Label::Positive
    } else if score < 0.0 {
        Label::Negative
    } else {
        Label::Neutral
    };

    Ok(Classification {
        label,
        score,
        tokens: words.len(),
    })
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.replace('\'', "").to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}
