pub mod calendar;
pub mod config;
pub mod data;
pub mod error;
pub mod feature;
pub mod inspect;
pub mod instruments;
pub mod layout;
pub mod pipeline;
pub mod table;

pub use calendar::{Calendar, build_calendar};
pub use config::{Config, FieldMapping};
pub use error::{Result, StoreError};
pub use feature::{SerializeSummary, read_feature, serialize};
pub use inspect::{StoreReport, inspect_store, store_fingerprint};
pub use instruments::{InstrumentIndex, build_instrument_index, repair_instrument_file, write_market};
pub use layout::StoreLayout;
pub use pipeline::{ConversionPipeline, ConversionSummary};
pub use table::{ObservationKey, ObservationRow, ObservationTable};
