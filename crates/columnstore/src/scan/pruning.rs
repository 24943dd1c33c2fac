//! Statistics-based file pruning.
//!
//! Before any data file is opened, the active filter predicates are
//! evaluated against each file's cached column summaries; files whose
//! predicate is provably always false are dropped from the scan. Pruning
//! never renumbers files: callers keep the pre-pruning indices.

use std::collections::HashSet;
use std::sync::Arc;

use datafusion::arrow::array::{ArrayRef, BooleanArray, UInt64Array};
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::common::stats::Precision;
use datafusion::common::{Column, ColumnStatistics, DFSchema, ScalarValue, Statistics};
use datafusion::execution::context::ExecutionProps;
use datafusion::logical_expr::Expr;
use datafusion::physical_expr::create_physical_expr;
use datafusion::physical_optimizer::pruning::{PruningPredicate, PruningStatistics};
use tracing::debug;

/// Evaluates filter predicates against per-file statistics.
///
/// Each data file is one pruning container; the statistics come from the
/// footers cached at file finalize.
pub struct FilePruner {
    schema: SchemaRef,
    files: Vec<Arc<Statistics>>,
}

impl FilePruner {
    pub fn new(schema: SchemaRef, files: Vec<Arc<Statistics>>) -> Self {
        Self { schema, files }
    }

    /// Returns the indices of the files that survive the filters, in their
    /// original file-list order.
    ///
    /// Pruning is best-effort: a predicate that cannot be turned into a
    /// pruning predicate, or a pruning evaluation error, keeps every file.
    pub fn prune(&self, filters: &[Expr]) -> Vec<usize> {
        let keep_all = || (0..self.files.len()).collect();

        let Some(predicate) = conjunction(filters) else {
            return keep_all();
        };
        let Some(pruning_predicate) = self.build_pruning_predicate(&predicate) else {
            return keep_all();
        };

        match pruning_predicate.prune(self) {
            Ok(keep) => keep
                .into_iter()
                .enumerate()
                .filter_map(|(file_number, keep)| keep.then_some(file_number))
                .collect(),
            Err(err) => {
                debug!("file pruning failed, keeping all files: {err}");
                keep_all()
            }
        }
    }

    fn build_pruning_predicate(&self, predicate: &Expr) -> Option<Arc<PruningPredicate>> {
        let df_schema = DFSchema::try_from(self.schema.as_ref().clone()).ok()?;
        let physical =
            create_physical_expr(predicate, &df_schema, &ExecutionProps::new()).ok()?;
        match PruningPredicate::try_new(physical, self.schema.clone()) {
            // An always-true pruning predicate cannot drop anything.
            Ok(pruning) if pruning.always_true() => None,
            Ok(pruning) => Some(Arc::new(pruning)),
            Err(err) => {
                debug!("failed to create pruning predicate: {err}");
                None
            }
        }
    }

    fn column_index(&self, column: &Column) -> Option<usize> {
        self.schema.index_of(column.name()).ok()
    }

    fn scalar_column<F>(&self, column: &Column, get: F) -> Option<ArrayRef>
    where
        F: Fn(&ColumnStatistics) -> &Precision<ScalarValue>,
    {
        let idx = self.column_index(column)?;
        let null = ScalarValue::try_from(self.schema.field(idx).data_type()).ok()?;
        let values = self.files.iter().map(|stats| {
            stats
                .column_statistics
                .get(idx)
                .and_then(|cs| get(cs).get_value().cloned())
                .unwrap_or_else(|| null.clone())
        });
        ScalarValue::iter_to_array(values).ok()
    }
}

impl PruningStatistics for FilePruner {
    fn min_values(&self, column: &Column) -> Option<ArrayRef> {
        self.scalar_column(column, |cs| &cs.min_value)
    }

    fn max_values(&self, column: &Column) -> Option<ArrayRef> {
        self.scalar_column(column, |cs| &cs.max_value)
    }

    fn num_containers(&self) -> usize {
        self.files.len()
    }

    fn null_counts(&self, column: &Column) -> Option<ArrayRef> {
        let idx = self.column_index(column)?;
        let counts: UInt64Array = self
            .files
            .iter()
            .map(|stats| {
                stats
                    .column_statistics
                    .get(idx)
                    .and_then(|cs| cs.null_count.get_value().map(|v| *v as u64))
            })
            .collect();
        Some(Arc::new(counts))
    }

    fn row_counts(&self, _column: &Column) -> Option<ArrayRef> {
        let counts: UInt64Array = self
            .files
            .iter()
            .map(|stats| stats.num_rows.get_value().map(|v| *v as u64))
            .collect();
        Some(Arc::new(counts))
    }

    fn contained(&self, _column: &Column, _values: &HashSet<ScalarValue>) -> Option<BooleanArray> {
        None
    }
}

fn conjunction(filters: &[Expr]) -> Option<Expr> {
    filters.iter().cloned().reduce(|acc, filter| acc.and(filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use datafusion::prelude::{col, lit};

    fn int_file_stats(schema: &SchemaRef, min: i32, max: i32, rows: usize) -> Arc<Statistics> {
        let mut stats = Statistics::new_unknown(schema);
        stats.num_rows = Precision::Exact(rows);
        stats.column_statistics[0].null_count = Precision::Exact(0);
        stats.column_statistics[0].min_value = Precision::Exact(ScalarValue::Int32(Some(min)));
        stats.column_statistics[0].max_value = Precision::Exact(ScalarValue::Int32(Some(max)));
        Arc::new(stats)
    }

    fn test_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("v", DataType::Int32, false)]))
    }

    #[test]
    fn drops_provably_empty_files() {
        let schema = test_schema();
        let pruner = FilePruner::new(
            schema.clone(),
            vec![
                int_file_stats(&schema, 0, 999, 1000),
                int_file_stats(&schema, 1000, 1999, 1000),
            ],
        );

        // Only the first file can contain v < 500; indices are original.
        assert_eq!(pruner.prune(&[col("v").lt(lit(500))]), vec![0]);
        // Both can contain v >= 500.
        assert_eq!(pruner.prune(&[col("v").gt_eq(lit(500))]), vec![0, 1]);
        // Nothing can contain v < 0.
        assert!(pruner.prune(&[col("v").lt(lit(0))]).is_empty());
    }

    #[test]
    fn no_filters_keeps_every_file() {
        let schema = test_schema();
        let pruner = FilePruner::new(
            schema.clone(),
            vec![
                int_file_stats(&schema, 0, 9, 10),
                int_file_stats(&schema, 10, 19, 10),
            ],
        );
        assert_eq!(pruner.prune(&[]), vec![0, 1]);
    }

    #[test]
    fn unresolvable_predicate_keeps_every_file() {
        let schema = test_schema();
        let pruner = FilePruner::new(schema.clone(), vec![int_file_stats(&schema, 0, 9, 10)]);
        // References a column the schema does not have.
        assert_eq!(pruner.prune(&[col("missing").lt(lit(1))]), vec![0]);
    }
}
