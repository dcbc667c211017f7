use crate::{CategoryScope, Observation, Result, StoredPrediction};

/// Read side of the historical price table.
pub trait HistoricalSource {
    /// Load every observation whose category is in `scope`.
    ///
    /// Years arrive as integers. Prices that were missing or not numeric
    /// upstream arrive as `None`.
    fn load_observations(&self, scope: &CategoryScope) -> Result<Vec<Observation>>;
}

impl HistoricalSource for [Observation] {
    fn load_observations(&self, scope: &CategoryScope) -> Result<Vec<Observation>> {
        Ok(self
            .iter()
            .filter(|o| scope.includes(&o.category))
            .cloned()
            .collect())
    }
}

impl HistoricalSource for Vec<Observation> {
    fn load_observations(&self, scope: &CategoryScope) -> Result<Vec<Observation>> {
        self.as_slice().load_observations(scope)
    }
}

/// Write side of the prediction table.
///
/// All writes go through a transaction so that a failed run never leaves a
/// mix of old and new predictions behind.
pub trait PredictionStore {
    type Tx<'a>: PredictionTransaction
    where
        Self: 'a;

    fn begin(&mut self) -> Result<Self::Tx<'_>>;
}

/// An open write transaction. Dropping it without `commit` rolls back.
pub trait PredictionTransaction {
    /// Delete every stored prediction whose category is in `scope`.
    /// Returns the number of deleted rows.
    fn clear_scope(&mut self, scope: &CategoryScope) -> Result<usize>;

    /// Insert `records`, returning the number of inserted rows.
    fn write_batch(&mut self, records: &[StoredPrediction]) -> Result<usize>;

    fn commit(self) -> Result<()>;
}
