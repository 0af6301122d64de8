use burn::data::dataset::Dataset;

use crate::domain::example::NqExample;

/// In-memory collection of filtered examples.
pub struct NqDataset {
    examples: Vec<NqExample>,
}

impl NqDataset {
    pub fn new(examples: Vec<NqExample>) -> Self { Self { examples } }

    pub fn example_count(&self) -> usize { self.examples.len() }

    /// Token length of every example, in dataset order
    pub fn lengths(&self) -> Vec<usize> {
        self.examples.iter().map(NqExample::len).collect()
    }

    pub fn max_len(&self) -> usize {
        self.examples.iter().map(NqExample::len).max().unwrap_or(0)
    }

    pub fn examples(&self) -> &[NqExample] {
        &self.examples
    }

    /// A view of this dataset in the given index order.
    /// Indices may repeat and need not cover the whole dataset.
    pub fn ordered(&self, order: Vec<usize>) -> OrderedDataset {
        let examples = order
            .into_iter()
            .filter_map(|i| self.examples.get(i).cloned())
            .collect();
        OrderedDataset { examples }
    }
}

/// One epoch's batch order, materialised for the DataLoader.
pub struct OrderedDataset {
    examples: Vec<NqExample>,
}

impl Dataset<NqExample> for OrderedDataset {
    fn get(&self, index: usize) -> Option<NqExample> {
        self.examples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }
}
