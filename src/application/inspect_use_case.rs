// ============================================================
// Layer 2 — InspectUseCase
// ============================================================
// A sanity check on preprocessed data before spending GPU
// hours on it. For the first N answerable training examples:
//
//   question → tokens before the first separator, decoded
//   answer   → input_ids[start..=end], decoded
//
// and the width those examples would collate to.

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::data::batcher::collate;
use crate::data::loader::JsonlExampleSource;
use crate::data::sampler::filter_answerless;
use crate::domain::traits::ExampleSource;
use crate::infra::pretrained::{resolve_pad_id, resolve_sep_id, PretrainedModelDir};

#[derive(Debug, Clone, PartialEq)]
pub struct InspectedExample {
    pub index:       usize,
    pub length:      usize,
    pub start_token: i64,
    pub end_token:   i64,
    pub question:    String,
    pub answer:      String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InspectReport {
    /// Answerable examples in the file
    pub answerable:  usize,
    pub examples:    Vec<InspectedExample>,
    /// Collated width of `examples` as one batch
    pub batch_width: usize,
}

pub struct InspectUseCase {
    data_path:     PathBuf,
    model_dir:     PathBuf,
    count:         usize,
    pad_threshold: usize,
}

impl InspectUseCase {
    pub fn new(
        data_path:     impl Into<PathBuf>,
        model_dir:     impl Into<PathBuf>,
        count:         usize,
        pad_threshold: usize,
    ) -> Self {
        Self {
            data_path: data_path.into(),
            model_dir: model_dir.into(),
            count,
            pad_threshold,
        }
    }

    pub fn execute(&self) -> Result<InspectReport> {
        let model_dir = PretrainedModelDir::new(&self.model_dir);
        let tokenizer = model_dir.load_tokenizer()?;
        let pad_id = resolve_pad_id(&model_dir.load_config()?, &tokenizer);
        let sep_id = resolve_sep_id(&tokenizer);
        if sep_id.is_none() {
            tracing::warn!("Tokenizer has no [SEP] or </s> token; showing whole sequences as questions");
        }

        let examples = filter_answerless(JsonlExampleSource::new(&self.data_path).load_all()?);
        let shown = &examples[..self.count.min(examples.len())];

        let decode = |ids: &[u32]| {
            tokenizer
                .decode(ids, true)
                .map_err(|e| anyhow!("Cannot decode tokens: {e}"))
        };

        let mut inspected = Vec::with_capacity(shown.len());
        for (index, ex) in shown.iter().enumerate() {
            let question_end = sep_id
                .and_then(|sep| ex.input_ids.iter().position(|&t| t == sep))
                .unwrap_or(ex.len());
            let answer = match ex.answer_ids() {
                Some(ids) => decode(ids)?,
                None => String::new(),
            };
            inspected.push(InspectedExample {
                index,
                length:      ex.len(),
                start_token: ex.start_token,
                end_token:   ex.end_token,
                question:    decode(&ex.input_ids[..question_end])?,
                answer,
            });
        }

        let batch_width = if shown.is_empty() {
            0
        } else {
            collate(shown, pad_id, self.pad_threshold).width
        };

        Ok(InspectReport { answerable: examples.len(), examples: inspected, batch_width })
    }
}
