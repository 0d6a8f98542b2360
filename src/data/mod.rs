//! Data layer: core types, loading, cleaning, and preparation.
//!
//! Architecture:
//! ```text
//!  .parquet / .csv / .json          data_Q*_<year>/*.csv
//!        │                                 │
//!        ▼                                 ▼
//!   ┌──────────┐                    ┌───────────────┐
//!   │  loader   │ load_file          │    loader      │ load_quarters
//!   └──────────┘                    └───────────────┘
//!        │                                 │
//!        └──────────────┬──────────────────┘
//!                       ▼
//!                ┌─────────────┐
//!                │   Dataset    │  fields + Vec<Record>
//!                └─────────────┘
//!                       │
//!                       ▼
//!                ┌─────────────┐
//!                │    clean     │  DatasetKind → CleaningRules
//!                └─────────────┘
//!                       │
//!          ┌────────────┼──────────────┐
//!          ▼            ▼              ▼
//!    ┌──────────┐ ┌──────────┐   ┌──────────┐
//!    │ sampling  │ │ timeline  │   │  export   │  preview / parquet
//!    └──────────┘ └──────────┘   └──────────┘
//! ```

pub mod clean;
pub mod export;
pub mod loader;
pub mod model;
pub mod sampling;
pub mod timeline;

pub use clean::{clean, clean_as, CleaningRules, DatasetKind, MissingPolicy};
pub use export::{preview, write_parquet};
pub use loader::{load_file, load_quarters};
pub use model::{Dataset, Field, Record, Value, ValueKind};
