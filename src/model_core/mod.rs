pub mod builder;
pub mod dimensions;
pub mod exporter;
pub mod fact;
pub mod reader;
pub mod reconciler;
pub mod surrogate;

pub use builder::{BuildError, Dimensions, ModelBuilder, StarSchema, TableCounts};
pub use dimensions::{DimChain, DimDate, DimProduct, DimStore};
pub use exporter::{export_star, reload_counts, ExportError, ExportSummary};
pub use fact::FactMenuPrice;
pub use reader::{read_csv_batch, read_csv_dir, read_sqlite_batch, RawBatch};
pub use reconciler::{clean, union_by_name, CleanDataset, RawDataset, ReconcileError, SentinelFilter, TypedRow};
