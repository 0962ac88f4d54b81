/// Data layer: core types, file adapters, loading, and filtering.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → RawTable        (only module doing I/O)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │   load    │  validate columns → RawDataset, join formulas
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  blank ratio test → cumulative-contribution prefix
///   └──────────┘
/// ```

pub mod filter;
pub mod load;
pub mod loader;
pub mod model;
