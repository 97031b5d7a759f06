//! Block-wise running mean over accepted lag estimates.
//!
//! Estimates are averaged into fixed-size blocks held in a ring. The trusted
//! ("valid") mean only covers completed blocks; the "current" mean also
//! includes the block still being filled.

/// Ring of block means
#[derive(Debug, Clone)]
pub struct BlockAverage {
    values: Vec<f64>,
    block_size: usize,
    block_idx: usize,
    idx: usize,
    valid_blocks: usize,
}

impl BlockAverage {
    /// Create a ring of `num_blocks` blocks, each pre-set to `initial_value`.
    ///
    /// `valid_blocks_seed` resumes a previous session: that many blocks count
    /// as completed and filling starts at `seed % num_blocks`. Seeds above
    /// `num_blocks` are clamped.
    pub fn new(
        num_blocks: usize,
        block_size: usize,
        valid_blocks_seed: usize,
        initial_value: f64,
    ) -> Self {
        let num_blocks = num_blocks.max(1);
        let valid_blocks = valid_blocks_seed.min(num_blocks);
        Self {
            values: vec![initial_value; num_blocks],
            block_size: block_size.max(1),
            block_idx: valid_blocks % num_blocks,
            idx: 0,
            valid_blocks,
        }
    }

    /// Fold one value into the block being filled
    pub fn update(&mut self, value: f64) {
        let current = &mut self.values[self.block_idx];
        *current = (self.idx as f64 * *current + value) / (self.idx + 1) as f64;

        self.idx = (self.idx + 1) % self.block_size;
        if self.idx == 0 {
            self.block_idx = (self.block_idx + 1) % self.values.len();
            self.valid_blocks = (self.valid_blocks + 1).min(self.values.len());
        }
    }

    /// `(valid_mean, current_mean)`, `None` where no block qualifies
    pub fn get(&self) -> (Option<f64>, Option<f64>) {
        let mut valid_sum = 0.0;
        let mut valid_count = 0usize;
        for (i, value) in self.values.iter().enumerate().take(self.valid_blocks) {
            if i != self.block_idx {
                valid_sum += value;
                valid_count += 1;
            }
        }

        let (current_sum, current_count) = if self.idx > 0 {
            (valid_sum + self.values[self.block_idx], valid_count + 1)
        } else {
            (valid_sum, valid_count)
        };

        (
            mean(valid_sum, valid_count),
            mean(current_sum, current_count),
        )
    }

    /// Raw block means, in ring order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn valid_blocks(&self) -> usize {
        self.valid_blocks
    }

    pub fn block_idx(&self) -> usize {
        self.block_idx
    }

    /// Values folded into the current block
    pub fn idx(&self) -> usize {
        self.idx
    }

    pub fn num_blocks(&self) -> usize {
        self.values.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

fn mean(sum: f64, count: usize) -> Option<f64> {
    (count > 0).then(|| sum / count as f64)
}
