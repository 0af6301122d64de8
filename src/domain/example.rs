// ============================================================
// Layer 3 — NqExample Domain Type
// ============================================================
// One pre-tokenised Natural Questions instance.
//
// The token sequence is already in model input format:
//   [CLS] question [SEP] context [SEP]
// and the answer is a SPAN of token indices into that sequence.
//
// An example whose span is (0, 0) points at [CLS], which the
// preprocessing step uses to mean "this context has no answer".
// Those examples are dropped before training and evaluation.
//
// Offsets are signed and not guaranteed to fall inside the
// sequence. Every such record is kept; when turned into a
// training target:
//   offset < 0        → 0 ([CLS])
//   offset >= length  → no target, ignored by the loss
//
// Reference: Kwiatkowski et al. (2019) Natural Questions
//            Zaheer et al. (2020) BigBird

use serde::{Deserialize, Serialize};

/// A labelled extractive QA example, one line of the JSONL input.
///
/// Extra fields in the record (e.g. `category`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NqExample {
    /// Token ids of the full input sequence
    pub input_ids: Vec<u32>,

    /// Index of the FIRST answer token in `input_ids`
    pub start_token: i64,

    /// Index of the LAST answer token in `input_ids` (inclusive)
    pub end_token: i64,
}

/// Training target for a raw offset into a sequence of `len` tokens.
pub fn target_index(offset: i64, len: usize) -> Option<usize> {
    let index = offset.max(0) as usize;
    (index < len).then_some(index)
}

impl NqExample {
    pub fn new(input_ids: Vec<u32>, start_token: i64, end_token: i64) -> Self {
        Self { input_ids, start_token, end_token }
    }

    /// True when the span is the (0, 0) "no answer" marker
    pub fn is_answerless(&self) -> bool {
        self.start_token == 0 && self.end_token == 0
    }

    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    pub fn start_target(&self) -> Option<usize> {
        target_index(self.start_token, self.len())
    }

    pub fn end_target(&self) -> Option<usize> {
        target_index(self.end_token, self.len())
    }

    /// Both offsets name a token of `input_ids` as written
    pub fn span_in_range(&self) -> bool {
        let in_range = |o: i64| o >= 0 && (o as usize) < self.len();
        in_range(self.start_token) && in_range(self.end_token)
    }

    /// Token ids of the answer span, or None if the span is out of range
    pub fn answer_ids(&self) -> Option<&[u32]> {
        if !self.span_in_range() || self.start_token > self.end_token {
            return None;
        }
        self.input_ids
            .get(self.start_token as usize..=self.end_token as usize)
    }

    /// Checks the one structural invariant a record must satisfy:
    /// a non-empty token sequence.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("input_ids is empty".to_string());
        }
        Ok(())
    }
}
